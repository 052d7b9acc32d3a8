use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    /// Malformed or undecodable frame/header. Fatal to the connection that
    /// produced it, never to the process.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown type tag on decode, or a value whose type was never
    /// registered on encode. Surfaced before anything is sent.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No matching response arrived within the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, lost, or closed while calls were outstanding.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server reported a non-success status for the call.
    #[error("remote error: {0}")]
    Remote(String),

    /// Name resolution or interface metadata lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate registration during the init phase (serializer tag/type or
    /// service interface registered twice).
    #[error("registration error: {0}")]
    Registration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;
