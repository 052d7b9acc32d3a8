//! Name resolution: service name → network address.
//!
//! Consulted only at connection setup. The store behind the mapping is an
//! external concern; this module defines the contract plus an in-memory
//! implementation for wiring and tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;

use crate::protocol::error::{Result, RpcError};

/// Maps service names to addresses.
pub trait NameResolver: Send + Sync {
    /// Resolves a service name.
    ///
    /// # Errors
    ///
    /// Fails with [`RpcError::NotFound`] if the name was never registered.
    fn lookup(&self, service_name: &str) -> Result<SocketAddr>;

    /// Registers (or re-registers) a service at an address.
    fn register(&self, service_name: &str, addr: SocketAddr) -> Result<()>;
}

/// In-memory resolver backed by a locked map.
#[derive(Default)]
pub struct MemoryNameResolver {
    entries: RwLock<HashMap<String, SocketAddr>>,
}

impl MemoryNameResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameResolver for MemoryNameResolver {
    fn lookup(&self, service_name: &str) -> Result<SocketAddr> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RpcError::Transport("name resolver lock poisoned".to_string()))?;
        entries
            .get(service_name)
            .copied()
            .ok_or_else(|| RpcError::NotFound(format!("service not registered: {service_name}")))
    }

    fn register(&self, service_name: &str, addr: SocketAddr) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RpcError::Transport("name resolver lock poisoned".to_string()))?;
        entries.insert(service_name.to_string(), addr);
        Ok(())
    }
}
