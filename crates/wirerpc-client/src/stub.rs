//! Client-side stubs.
//!
//! A [`ServiceStub`] presents a remote interface locally: every invocation
//! serializes its arguments, wraps them in an [`RpcRequest`], and routes the
//! request through the transport, then maps the response back to the
//! method's declared return type.
//!
//! There is no per-interface code generation. An [`InterfaceDescriptor`] —
//! built once per interface — carries the method metadata, and one generic
//! invocation routine serves every interface shape.

use std::any::Any;
use std::sync::Arc;

use wirerpc_common::protocol::{next_request_id, Command, Header, RpcError, RpcRequest};
use wirerpc_common::serialize::{encode_args, SerializerRegistry};
use wirerpc_common::transport::Transport;
use wirerpc_common::Result;

/// Metadata for one method: its name and argument count.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    name: &'static str,
    arity: usize,
}

impl MethodDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

/// Metadata for one interface: name plus its method table, assembled once
/// at startup.
///
/// # Example
///
/// ```
/// use wirerpc_client::InterfaceDescriptor;
///
/// let hello = InterfaceDescriptor::new("HelloService").method("hello", 1);
/// assert!(hello.find("hello").is_some());
/// assert!(hello.find("goodbye").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    name: &'static str,
    methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(name: &'static str) -> Self {
        InterfaceDescriptor {
            name,
            methods: Vec::new(),
        }
    }

    /// Declares a method with the given argument count.
    pub fn method(mut self, name: &'static str, arity: usize) -> Self {
        self.methods.push(MethodDescriptor { name, arity });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn find(&self, method: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == method)
    }
}

/// A stub bound to one transport and one interface.
///
/// Cheap to clone; clones share the underlying connection.
#[derive(Clone)]
pub struct ServiceStub {
    transport: Transport,
    registry: Arc<SerializerRegistry>,
    interface: Arc<InterfaceDescriptor>,
}

impl ServiceStub {
    pub fn new(
        transport: Transport,
        registry: Arc<SerializerRegistry>,
        interface: InterfaceDescriptor,
    ) -> Self {
        ServiceStub {
            transport,
            registry,
            interface: Arc::new(interface),
        }
    }

    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }

    /// Calls a zero-argument method.
    pub async fn call0<R>(&self, method: &str) -> Result<R>
    where
        R: Any + Send,
    {
        let payload = self.invoke_remote(method, Vec::new()).await?;
        self.registry.deserialize(&payload)
    }

    /// Calls a single-argument method.
    pub async fn call1<A, R>(&self, method: &str, arg: &A) -> Result<R>
    where
        A: Any + Send,
        R: Any + Send,
    {
        let args = vec![self.registry.serialize(arg)?];
        let payload = self.invoke_remote(method, args).await?;
        self.registry.deserialize(&payload)
    }

    /// Calls a two-argument method.
    pub async fn call2<A, B, R>(&self, method: &str, first: &A, second: &B) -> Result<R>
    where
        A: Any + Send,
        B: Any + Send,
        R: Any + Send,
    {
        let args = vec![
            self.registry.serialize(first)?,
            self.registry.serialize(second)?,
        ];
        let payload = self.invoke_remote(method, args).await?;
        self.registry.deserialize(&payload)
    }

    /// The generic invocation routine behind every stub call: serialized
    /// arguments in, serialized result out.
    ///
    /// Validates the call against the interface metadata, builds and
    /// serializes the [`RpcRequest`], wraps it in a command with a fresh
    /// request ID, sends it, and awaits the correlated response.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NotFound`] if the method is not declared on the
    ///   interface (nothing is sent).
    /// - [`RpcError::Serialization`] if the argument count does not match
    ///   the declaration (nothing is sent).
    /// - [`RpcError::Remote`] if the server reported a non-success status.
    /// - [`RpcError::Timeout`] / [`RpcError::Transport`] from the transport,
    ///   propagated as-is.
    pub async fn invoke_remote(&self, method: &str, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        let descriptor = self.interface.find(method).ok_or_else(|| {
            RpcError::NotFound(format!(
                "method {method} not declared on interface {}",
                self.interface.name
            ))
        })?;
        if args.len() != descriptor.arity {
            return Err(RpcError::Serialization(format!(
                "method {}::{method} expects {} arguments, got {}",
                self.interface.name,
                descriptor.arity,
                args.len()
            )));
        }

        let request = RpcRequest::new(self.interface.name, method, encode_args(&args)?);
        let payload = self.registry.serialize(&request)?;
        let command = Command::request(next_request_id(), payload);

        let response = self.transport.send(command)?.await?;
        match response.header {
            Header::Response(header) => {
                if header.code.is_success() {
                    Ok(response.payload)
                } else {
                    Err(RpcError::Remote(header.error.unwrap_or_else(|| {
                        format!("remote call failed with status {:?}", header.code)
                    })))
                }
            }
            Header::Request(_) => Err(RpcError::Protocol(
                "correlated command carries a request header".to_string(),
            )),
        }
    }
}
