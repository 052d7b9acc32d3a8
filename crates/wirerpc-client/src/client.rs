//! Client access point.
//!
//! An [`RpcClient`] owns one multiplexed connection to a server and hands
//! out [`ServiceStub`]s over it. Dropping (or closing) the client releases
//! the connection on every exit path; stubs created from it then fail with
//! transport errors instead of hanging.

use std::sync::Arc;

use wirerpc_common::nameservice::NameResolver;
use wirerpc_common::serialize::SerializerRegistry;
use wirerpc_common::transport::{Transport, TransportConfig};
use wirerpc_common::Result;

use crate::stub::{InterfaceDescriptor, ServiceStub};

/// Access point for remote services on one server.
///
/// # Example
///
/// ```no_run
/// use wirerpc_client::{InterfaceDescriptor, RpcClient};
/// use wirerpc_common::serialize::SerializerRegistry;
///
/// # #[tokio::main]
/// # async fn main() -> wirerpc_common::Result<()> {
/// let registry = SerializerRegistry::builtin();
/// let client = RpcClient::connect("127.0.0.1:9000", registry).await?;
///
/// let hello = client.stub(InterfaceDescriptor::new("HelloService").method("hello", 1));
/// let reply: String = hello.call1("hello", &"Master MQ".to_string()).await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    transport: Transport,
    registry: Arc<SerializerRegistry>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Connects to a server address with default transport configuration.
    pub async fn connect(addr: &str, registry: Arc<SerializerRegistry>) -> Result<Self> {
        Self::connect_with(addr, registry, TransportConfig::default()).await
    }

    /// Connects to a server address.
    pub async fn connect_with(
        addr: &str,
        registry: Arc<SerializerRegistry>,
        config: TransportConfig,
    ) -> Result<Self> {
        let transport = Transport::connect_with(addr, config).await?;
        tracing::debug!(addr, "connected to server");
        Ok(RpcClient {
            transport,
            registry,
        })
    }

    /// Resolves a service name through the resolver, then connects to the
    /// resulting address.
    pub async fn connect_service(
        resolver: &dyn NameResolver,
        service_name: &str,
        registry: Arc<SerializerRegistry>,
        config: TransportConfig,
    ) -> Result<Self> {
        let addr = resolver.lookup(service_name)?;
        tracing::debug!(service_name, %addr, "resolved service");
        Self::connect_with(&addr.to_string(), registry, config).await
    }

    /// Builds a stub for an interface over this client's connection.
    pub fn stub(&self, interface: InterfaceDescriptor) -> ServiceStub {
        ServiceStub::new(self.transport.clone(), self.registry.clone(), interface)
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Closes the underlying connection. Idempotent; also runs on drop.
    pub fn close(&self) {
        self.transport.close();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.transport.close();
    }
}
