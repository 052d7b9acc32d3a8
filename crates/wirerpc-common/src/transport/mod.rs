//! Transport layer: wire codec, stream framing, and the multiplexed
//! connection.
//!
//! # Architecture
//!
//! - **[`codec`]**: byte-exact encode/decode of commands (header + opaque
//!   payload).
//! - **[`frame`]**: 4-byte big-endian length prefix delimiting commands on
//!   the byte stream, with a maximum frame size guard.
//! - **[`connection`]**: the async [`Transport`] — pending-request table,
//!   request/response correlation, timeout sweep, and connection lifecycle.

pub mod codec;
pub mod connection;
pub mod frame;

pub use codec::{decode_command, encode_command};
pub use connection::{ConnectionState, ResponseFuture, Transport, TransportConfig};
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};

#[cfg(test)]
mod tests;
