//! Binary codec for [`Command`]s.
//!
//! Wire layout (inside one frame; the frame length prefix is the transport's
//! job, see [`frame`](super::frame)):
//!
//! ```text
//! typeCode   : 1 byte   (0 = REQUEST, 1 = RESPONSE)
//! version    : 1 byte
//! requestId  : 8 bytes, big-endian
//! -- RESPONSE only --
//! statusCode : 1 byte   (0 = SUCCESS)
//! errLen     : 2 bytes, big-endian (0 on SUCCESS)
//! errMsg     : errLen bytes, UTF-8
//! payload    : remaining bytes, opaque to the codec
//! ```
//!
//! Encoding is deterministic; decoding fails with a protocol error on a
//! truncated header, an unrecognized type code, or an unsupported version.
//! The codec never inspects the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::command::{
    Code, Command, Header, RequestHeader, ResponseHeader, PROTOCOL_VERSION, TYPE_REQUEST,
    TYPE_RESPONSE,
};
use crate::protocol::error::{Result, RpcError};

/// Fixed size of the fields shared by both header variants.
const COMMON_HEADER_LEN: usize = 1 + 1 + 8;

/// Encodes a command into its wire representation.
///
/// Response error messages are clamped to the u16 length field (on a char
/// boundary), so encoding never fails.
pub fn encode_command(command: &Command) -> Bytes {
    let mut buf = BytesMut::with_capacity(COMMON_HEADER_LEN + 3 + command.payload.len());
    match &command.header {
        Header::Request(header) => {
            buf.put_u8(TYPE_REQUEST);
            buf.put_u8(header.version);
            buf.put_u64(header.request_id);
        }
        Header::Response(header) => {
            buf.put_u8(TYPE_RESPONSE);
            buf.put_u8(header.version);
            buf.put_u64(header.request_id);
            buf.put_u8(header.code.to_wire());
            let message = header.error.as_deref().unwrap_or("");
            let message = truncate_to(message, u16::MAX as usize);
            buf.put_u16(message.len() as u16);
            buf.put_slice(message.as_bytes());
        }
    }
    buf.put_slice(&command.payload);
    buf.freeze()
}

/// Decodes one wire frame into a command.
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let mut buf = bytes;
    if buf.remaining() < COMMON_HEADER_LEN {
        return Err(RpcError::Protocol(format!(
            "frame shorter than header: {} bytes",
            buf.remaining()
        )));
    }

    let type_code = buf.get_u8();
    let version = buf.get_u8();
    let request_id = buf.get_u64();

    if version != PROTOCOL_VERSION {
        return Err(RpcError::Protocol(format!(
            "unsupported protocol version: {version}"
        )));
    }

    let header = match type_code {
        TYPE_REQUEST => Header::Request(RequestHeader {
            version,
            request_id,
        }),
        TYPE_RESPONSE => {
            if buf.remaining() < 3 {
                return Err(RpcError::Protocol(
                    "truncated response header".to_string(),
                ));
            }
            let code = Code::from_wire(buf.get_u8());
            let error_len = buf.get_u16() as usize;
            if buf.remaining() < error_len {
                return Err(RpcError::Protocol(format!(
                    "truncated error message: expected {error_len} bytes, found {}",
                    buf.remaining()
                )));
            }
            let error = if error_len == 0 {
                None
            } else {
                let message = std::str::from_utf8(&buf[..error_len])
                    .map_err(|e| RpcError::Protocol(format!("error message is not UTF-8: {e}")))?
                    .to_string();
                Some(message)
            };
            buf.advance(error_len);
            Header::Response(ResponseHeader {
                version,
                request_id,
                code,
                error,
            })
        }
        other => {
            return Err(RpcError::Protocol(format!(
                "unrecognized header type code: {other}"
            )))
        }
    };

    Ok(Command {
        header,
        payload: buf.to_vec(),
    })
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_to(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
