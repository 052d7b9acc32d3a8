pub mod command;
pub mod error;
pub mod request;

#[cfg(test)]
mod tests;

pub use command::{
    Code, Command, Header, RequestHeader, RequestId, ResponseHeader, PROTOCOL_VERSION,
};
pub use error::{Result, RpcError};
pub use request::{next_request_id, RpcRequest};
