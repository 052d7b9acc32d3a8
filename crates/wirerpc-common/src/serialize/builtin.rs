//! Builtin serializers.
//!
//! Covers the primitive types the framework itself needs, plus
//! [`RpcRequest`], which travels through the registry like any user value.

use bytes::{BufMut, BytesMut};

use crate::protocol::error::{Result, RpcError};
use crate::protocol::request::RpcRequest;

use super::Serializer;

/// Tag bytes for the builtin serializers.
pub mod tags {
    pub const STRING: u8 = 0;
    pub const U64: u8 = 1;
    pub const UNIT: u8 = 2;
    pub const BYTES: u8 = 3;
    pub const RPC_REQUEST: u8 = 4;
}

/// UTF-8 strings, encoded as their raw bytes.
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn tag(&self) -> u8 {
        tags::STRING
    }

    fn size_hint(&self, value: &String) -> usize {
        value.len()
    }

    fn encode(&self, value: &String, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(value.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| RpcError::Serialization(format!("invalid UTF-8 string: {e}")))
    }
}

/// Big-endian 8-byte unsigned integers.
pub struct U64Serializer;

impl Serializer<u64> for U64Serializer {
    fn tag(&self) -> u8 {
        tags::U64
    }

    fn size_hint(&self, _value: &u64) -> usize {
        8
    }

    fn encode(&self, value: &u64, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(*value);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u64> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| {
            RpcError::Serialization(format!("expected 8 bytes for u64, found {}", bytes.len()))
        })?;
        Ok(u64::from_be_bytes(array))
    }
}

/// The unit type, for methods that return nothing. Zero bytes on the wire.
pub struct UnitSerializer;

impl Serializer<()> for UnitSerializer {
    fn tag(&self) -> u8 {
        tags::UNIT
    }

    fn size_hint(&self, _value: &()) -> usize {
        0
    }

    fn encode(&self, _value: &(), _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<()> {
        if !bytes.is_empty() {
            return Err(RpcError::Serialization(format!(
                "expected empty encoding for unit, found {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }
}

/// Opaque byte vectors, passed through untouched.
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn tag(&self) -> u8 {
        tags::BYTES
    }

    fn size_hint(&self, value: &Vec<u8>) -> usize {
        value.len()
    }

    fn encode(&self, value: &Vec<u8>, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(value);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// The RPC request body itself; delegates to [`RpcRequest::encode`].
pub struct RpcRequestSerializer;

impl Serializer<RpcRequest> for RpcRequestSerializer {
    fn tag(&self) -> u8 {
        tags::RPC_REQUEST
    }

    fn size_hint(&self, value: &RpcRequest) -> usize {
        2 + value.interface_name().len() + 2 + value.method_name().len() + 4 + value.args().len()
    }

    fn encode(&self, value: &RpcRequest, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&value.encode()?);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<RpcRequest> {
        RpcRequest::decode(bytes)
    }
}
