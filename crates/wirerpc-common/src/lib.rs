//! wirerpc common types and transport.
//!
//! This crate provides the core protocol, serialization, and transport
//! infrastructure shared by the wirerpc client and server:
//!
//! - **Protocol layer**: command/header wire types, the RPC request body,
//!   status codes, request-ID generation, and error handling.
//! - **Serialization**: the type-tagged serializer registry with its
//!   two-phase build-then-freeze lifecycle.
//! - **Transport layer**: binary codec, length-prefixed framing, and the
//!   multiplexed async connection that correlates responses to requests.
//! - **Name service**: the resolver contract consulted at connection setup.
//!
//! # Wire protocol
//!
//! Commands travel length-prefixed on a TCP stream:
//! `[4-byte length, big-endian] + [header + payload]`. See
//! [`transport::codec`] for the header layout and [`serialize`] for how
//! payload values are tagged.

pub mod nameservice;
pub mod protocol;
pub mod serialize;
pub mod transport;

pub use protocol::*;
