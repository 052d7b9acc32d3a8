//! Service registrations and the frozen service registry.
//!
//! Each registered service carries a per-method invoker table, built once
//! at registration time: the typed `method*` helpers close over the service
//! function and handle argument decoding and result encoding through the
//! serializer registry, so the hot dispatch path does a plain map lookup —
//! no reflection, no locking.
//!
//! Like the serializer registry, the lifecycle is two-phase:
//! [`ServiceRegistryBuilder`] collects registrations at startup, then
//! [`build`](ServiceRegistryBuilder::build) freezes the table for the
//! process lifetime. It is read concurrently by many dispatch calls.

use std::any::Any;
use std::collections::HashMap;

use wirerpc_common::protocol::{Code, RpcError};
use wirerpc_common::serialize::SerializerRegistry;
use wirerpc_common::Result;

/// Failure produced while dispatching one request. Mapped onto the response
/// status code and error message.
#[derive(Debug)]
pub struct DispatchError {
    pub code: Code,
    pub message: String,
}

impl DispatchError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        DispatchError {
            code,
            message: message.into(),
        }
    }

    /// Arguments did not decode into the method's expected shape.
    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::new(Code::BadArguments, message)
    }

    /// The service implementation reported a failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Code::Failure, message)
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// One method's invoker: decoded argument list in, serialized result out.
pub type Invoker =
    Box<dyn Fn(&SerializerRegistry, Vec<Vec<u8>>) -> DispatchResult<Vec<u8>> + Send + Sync>;

/// One service instance and its invoker table.
pub struct ServiceRegistration {
    interface_name: String,
    invokers: HashMap<String, Invoker>,
}

impl ServiceRegistration {
    pub fn new(interface_name: impl Into<String>) -> Self {
        ServiceRegistration {
            interface_name: interface_name.into(),
            invokers: HashMap::new(),
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn invoker(&self, method_name: &str) -> Option<&Invoker> {
        self.invokers.get(method_name)
    }

    /// Registers a raw invoker under a method name. First registration
    /// wins; a duplicate is ignored with a warning.
    pub fn method_raw(mut self, name: impl Into<String>, invoker: Invoker) -> Self {
        let name = name.into();
        if self.invokers.contains_key(&name) {
            tracing::warn!(
                interface = %self.interface_name,
                method = %name,
                "duplicate method registration ignored"
            );
            return self;
        }
        self.invokers.insert(name, invoker);
        self
    }

    /// Registers a zero-argument method.
    pub fn method0<R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        R: Any + Send,
        F: Fn() -> std::result::Result<R, String> + Send + Sync + 'static,
    {
        self.method_raw(
            name,
            Box::new(move |registry, args| {
                expect_arity(&args, 0)?;
                let result = f().map_err(DispatchError::failed)?;
                encode_result(registry, &result)
            }),
        )
    }

    /// Registers a single-argument method.
    pub fn method1<A, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: Any + Send,
        R: Any + Send,
        F: Fn(A) -> std::result::Result<R, String> + Send + Sync + 'static,
    {
        self.method_raw(
            name,
            Box::new(move |registry, args| {
                expect_arity(&args, 1)?;
                let arg: A = decode_arg(registry, &args[0])?;
                let result = f(arg).map_err(DispatchError::failed)?;
                encode_result(registry, &result)
            }),
        )
    }

    /// Registers a two-argument method.
    pub fn method2<A, B, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: Any + Send,
        B: Any + Send,
        R: Any + Send,
        F: Fn(A, B) -> std::result::Result<R, String> + Send + Sync + 'static,
    {
        self.method_raw(
            name,
            Box::new(move |registry, args| {
                expect_arity(&args, 2)?;
                let first: A = decode_arg(registry, &args[0])?;
                let second: B = decode_arg(registry, &args[1])?;
                let result = f(first, second).map_err(DispatchError::failed)?;
                encode_result(registry, &result)
            }),
        )
    }
}

fn expect_arity(args: &[Vec<u8>], arity: usize) -> DispatchResult<()> {
    if args.len() != arity {
        return Err(DispatchError::bad_arguments(format!(
            "expected {arity} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn decode_arg<A: Any + Send>(registry: &SerializerRegistry, bytes: &[u8]) -> DispatchResult<A> {
    registry
        .deserialize(bytes)
        .map_err(|e| DispatchError::bad_arguments(e.to_string()))
}

fn encode_result<R: Any + Send>(
    registry: &SerializerRegistry,
    result: &R,
) -> DispatchResult<Vec<u8>> {
    registry
        .serialize(result)
        .map_err(|e| DispatchError::failed(e.to_string()))
}

/// Write-phase of the service table: collects registrations, rejects
/// duplicate interface names.
#[derive(Default)]
pub struct ServiceRegistryBuilder {
    services: HashMap<String, ServiceRegistration>,
}

impl std::fmt::Debug for ServiceRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistryBuilder")
            .finish_non_exhaustive()
    }
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Fails with [`RpcError::Registration`] if the interface name is
    /// already registered.
    pub fn register(mut self, registration: ServiceRegistration) -> Result<Self> {
        let name = registration.interface_name().to_string();
        if self.services.contains_key(&name) {
            return Err(RpcError::Registration(format!(
                "service already registered: {name}"
            )));
        }
        self.services.insert(name, registration);
        Ok(self)
    }

    /// Freezes the table. Read-only from here on, so concurrent dispatch
    /// lookups need no locking.
    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            services: self.services,
        }
    }
}

/// Read-phase of the service table.
pub struct ServiceRegistry {
    services: HashMap<String, ServiceRegistration>,
}

impl ServiceRegistry {
    pub fn get(&self, interface_name: &str) -> Option<&ServiceRegistration> {
        self.services.get(interface_name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
