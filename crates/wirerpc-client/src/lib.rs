//! wirerpc client: access point and service stubs.

pub mod client;
pub mod stub;

pub use client::RpcClient;
pub use stub::{InterfaceDescriptor, MethodDescriptor, ServiceStub};
