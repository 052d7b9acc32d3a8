//! wirerpc server: service registry, dispatcher, and TCP serving loop.

pub mod dispatcher;
pub mod registry;
pub mod server;

pub use dispatcher::Dispatcher;
pub use registry::{
    DispatchError, DispatchResult, Invoker, ServiceRegistration, ServiceRegistry,
    ServiceRegistryBuilder,
};
pub use server::RpcServer;
