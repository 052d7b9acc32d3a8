//! The RPC request body and request-ID generation.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut, BytesMut};

use super::command::RequestId;
use super::error::{Result, RpcError};

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns the next request ID.
///
/// Process-wide monotonic counter; concurrent callers always receive
/// distinct values, so IDs in flight on one connection never collide.
pub fn next_request_id() -> RequestId {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// A remote invocation: which interface, which method, and the serialized
/// argument list. Immutable once built.
///
/// Travels through the serializer registry like any other value (it has its
/// own type tag), so the transport stays oblivious to its structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    interface_name: String,
    method_name: String,
    args: Vec<u8>,
}

impl RpcRequest {
    pub fn new(
        interface_name: impl Into<String>,
        method_name: impl Into<String>,
        args: Vec<u8>,
    ) -> Self {
        RpcRequest {
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            args,
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The serialized argument list, opaque at this layer.
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Encodes as three length-prefixed fields:
    /// `[u16 len][interface][u16 len][method][u32 len][args]`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let interface = self.interface_name.as_bytes();
        let method = self.method_name.as_bytes();
        if interface.len() > u16::MAX as usize {
            return Err(RpcError::Serialization(format!(
                "interface name too long: {} bytes",
                interface.len()
            )));
        }
        if method.len() > u16::MAX as usize {
            return Err(RpcError::Serialization(format!(
                "method name too long: {} bytes",
                method.len()
            )));
        }
        if self.args.len() > u32::MAX as usize {
            return Err(RpcError::Serialization(format!(
                "argument list too long: {} bytes",
                self.args.len()
            )));
        }

        let mut buf =
            BytesMut::with_capacity(2 + interface.len() + 2 + method.len() + 4 + self.args.len());
        buf.put_u16(interface.len() as u16);
        buf.put_slice(interface);
        buf.put_u16(method.len() as u16);
        buf.put_slice(method);
        buf.put_u32(self.args.len() as u32);
        buf.put_slice(&self.args);
        Ok(buf.to_vec())
    }

    /// Decodes the layout produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;

        let interface_name = read_string_u16(&mut buf, "interface name")?;
        let method_name = read_string_u16(&mut buf, "method name")?;

        if buf.remaining() < 4 {
            return Err(RpcError::Serialization(
                "truncated request: missing argument length".to_string(),
            ));
        }
        let args_len = buf.get_u32() as usize;
        if buf.remaining() < args_len {
            return Err(RpcError::Serialization(format!(
                "truncated request: expected {} argument bytes, found {}",
                args_len,
                buf.remaining()
            )));
        }
        let args = buf[..args_len].to_vec();
        buf.advance(args_len);
        if buf.has_remaining() {
            return Err(RpcError::Serialization(format!(
                "trailing garbage after request: {} bytes",
                buf.remaining()
            )));
        }

        Ok(RpcRequest {
            interface_name,
            method_name,
            args,
        })
    }
}

fn read_string_u16(buf: &mut &[u8], field: &str) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(RpcError::Serialization(format!(
            "truncated request: missing {field} length"
        )));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(RpcError::Serialization(format!(
            "truncated request: expected {} bytes for {field}, found {}",
            len,
            buf.remaining()
        )));
    }
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|e| RpcError::Serialization(format!("{field} is not valid UTF-8: {e}")))?
        .to_string();
    buf.advance(len);
    Ok(value)
}
