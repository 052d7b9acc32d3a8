//! TCP server: accepts connections and serves requests through the
//! dispatcher.

use std::sync::Arc;

use tokio::net::TcpListener;

use wirerpc_common::protocol::RpcError;
use wirerpc_common::transport::{Transport, TransportConfig};
use wirerpc_common::Result;

use crate::dispatcher::Dispatcher;

/// Async TCP server for wirerpc.
///
/// Each accepted connection gets its own transport; inbound requests on a
/// connection are dispatched concurrently, and responses are written back
/// on the connection that carried the request. A failed connection fails
/// alone — the accept loop keeps serving.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wirerpc_common::serialize::SerializerRegistry;
/// use wirerpc_server::{Dispatcher, RpcServer, ServiceRegistration, ServiceRegistryBuilder};
///
/// # #[tokio::main]
/// # async fn main() -> wirerpc_common::Result<()> {
/// let services = ServiceRegistryBuilder::new()
///     .register(
///         ServiceRegistration::new("HelloService")
///             .method1("hello", |name: String| Ok(format!("Hello, {name}"))),
///     )?
///     .build();
/// let dispatcher = Dispatcher::new(SerializerRegistry::builtin(), Arc::new(services));
///
/// let server = RpcServer::bind("127.0.0.1:9000", dispatcher).await?;
/// server.run().await
/// # }
/// ```
pub struct RpcServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: TransportConfig,
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer").finish_non_exhaustive()
    }
}

impl RpcServer {
    /// Binds to an address with default transport configuration.
    pub async fn bind(bind_addr: &str, dispatcher: Dispatcher) -> Result<Self> {
        Self::bind_with(bind_addr, dispatcher, TransportConfig::default()).await
    }

    /// Binds to an address.
    pub async fn bind_with(
        bind_addr: &str,
        dispatcher: Dispatcher,
        config: TransportConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            RpcError::Transport(format!("failed to bind to {bind_addr}: {e}"))
        })?;
        Ok(RpcServer {
            listener,
            dispatcher: Arc::new(dispatcher),
            config,
        })
    }

    /// The actually bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Transport(format!("failed to get local addr: {e}")))
    }

    /// Accepts connections forever, serving each over its own transport.
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(|e| {
                RpcError::Transport(format!("failed to accept connection: {e}"))
            })?;
            tracing::info!(%peer_addr, "connection established");

            let dispatcher = self.dispatcher.clone();
            let _transport = Transport::with_handler(stream, self.config.clone(), move |command| {
                let dispatcher = dispatcher.clone();
                async move { Some(dispatcher.dispatch(&command)) }
            });
            // The transport's I/O tasks keep the connection alive until the
            // peer disconnects or a protocol error closes it.
        }
    }
}
