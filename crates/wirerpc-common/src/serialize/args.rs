//! Argument-list envelope.
//!
//! A method's arguments are serialized individually through the registry,
//! then packed as `[count: u8]` followed by `[len: u32 BE][bytes]` per
//! argument. Single-argument calls use the same envelope so the dispatcher
//! never special-cases arity.

use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::error::{Result, RpcError};

/// Maximum arguments per call; bounded by the count byte.
pub const MAX_ARGS: usize = u8::MAX as usize;

/// Packs already-serialized argument values into one byte sequence.
pub fn encode_args(args: &[Vec<u8>]) -> Result<Vec<u8>> {
    if args.len() > MAX_ARGS {
        return Err(RpcError::Serialization(format!(
            "too many arguments: {} (max {MAX_ARGS})",
            args.len()
        )));
    }

    let total: usize = args.iter().map(|arg| 4 + arg.len()).sum();
    let mut buf = BytesMut::with_capacity(1 + total);
    buf.put_u8(args.len() as u8);
    for arg in args {
        if arg.len() > u32::MAX as usize {
            return Err(RpcError::Serialization(format!(
                "argument too large: {} bytes",
                arg.len()
            )));
        }
        buf.put_u32(arg.len() as u32);
        buf.put_slice(arg);
    }
    Ok(buf.to_vec())
}

/// Unpacks an argument-list envelope into its serialized members.
pub fn decode_args(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut buf = bytes;
    if !buf.has_remaining() {
        return Err(RpcError::Serialization(
            "truncated argument list: missing count".to_string(),
        ));
    }
    let count = buf.get_u8() as usize;

    let mut args = Vec::with_capacity(count);
    for index in 0..count {
        if buf.remaining() < 4 {
            return Err(RpcError::Serialization(format!(
                "truncated argument list: missing length of argument {index}"
            )));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(RpcError::Serialization(format!(
                "truncated argument list: argument {index} needs {len} bytes, found {}",
                buf.remaining()
            )));
        }
        args.push(buf[..len].to_vec());
        buf.advance(len);
    }
    if buf.has_remaining() {
        return Err(RpcError::Serialization(format!(
            "trailing garbage after argument list: {} bytes",
            buf.remaining()
        )));
    }
    Ok(args)
}
