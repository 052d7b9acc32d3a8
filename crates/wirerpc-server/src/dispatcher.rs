//! Request dispatch: the inverse of the client stub.
//!
//! For each inbound request command the dispatcher decodes the
//! [`RpcRequest`], routes it to the registered service's invoker, and turns
//! the outcome — result or failure — into a response command carrying the
//! same request ID. Every failure mode becomes an error response; nothing
//! escapes to the transport loop or takes down the process.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use wirerpc_common::protocol::{Code, Command, RpcRequest};
use wirerpc_common::serialize::{decode_args, SerializerRegistry};

use crate::registry::{DispatchError, DispatchResult, ServiceRegistry};

/// Routes inbound requests to registered services.
///
/// Cheap to clone; shares the frozen registries.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SerializerRegistry>,
    services: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SerializerRegistry>, services: Arc<ServiceRegistry>) -> Self {
        Dispatcher { registry, services }
    }

    /// Dispatches one request command and builds its response command.
    ///
    /// The response reuses the inbound request ID. Failures map to status
    /// codes: unknown interface → `NoService`, unknown method → `NoMethod`,
    /// undecodable arguments → `BadArguments`, service failure or panic →
    /// `Failure` with the carried message.
    pub fn dispatch(&self, command: &Command) -> Command {
        let request_id = command.request_id();
        match self.try_dispatch(command) {
            Ok(payload) => Command::success(request_id, payload),
            Err(e) => {
                tracing::debug!(
                    request_id,
                    code = ?e.code,
                    message = %e.message,
                    "request dispatch failed"
                );
                Command::error(request_id, e.code, e.message)
            }
        }
    }

    fn try_dispatch(&self, command: &Command) -> DispatchResult<Vec<u8>> {
        let request: RpcRequest = self
            .registry
            .deserialize(&command.payload)
            .map_err(|e| DispatchError::failed(format!("invalid request payload: {e}")))?;

        let registration = self.services.get(request.interface_name()).ok_or_else(|| {
            DispatchError::new(
                Code::NoService,
                format!("no such service: {}", request.interface_name()),
            )
        })?;

        let invoker = registration.invoker(request.method_name()).ok_or_else(|| {
            DispatchError::new(
                Code::NoMethod,
                format!(
                    "no such method: {}::{}",
                    request.interface_name(),
                    request.method_name()
                ),
            )
        })?;

        let args = decode_args(request.args())
            .map_err(|e| DispatchError::bad_arguments(e.to_string()))?;

        // A panicking service must not take the serving loop with it.
        catch_unwind(AssertUnwindSafe(|| invoker(&self.registry, args))).unwrap_or_else(
            |panic| {
                let message = panic_message(&panic);
                tracing::warn!(
                    interface = %request.interface_name(),
                    method = %request.method_name(),
                    %message,
                    "service implementation panicked"
                );
                Err(DispatchError::failed(message))
            },
        )
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "service panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use wirerpc_common::protocol::{next_request_id, Header, RpcError};
    use wirerpc_common::serialize::encode_args;

    use crate::registry::{ServiceRegistration, ServiceRegistryBuilder};

    use super::*;

    fn hello_dispatcher() -> Dispatcher {
        let services = ServiceRegistryBuilder::new()
            .register(
                ServiceRegistration::new("HelloService")
                    .method1("hello", |name: String| Ok(format!("Hello, {name}")))
                    .method1("boom", |_: String| Err::<String, _>("boom".to_string()))
                    .method1("panic", |_: String| -> Result<String, String> {
                        panic!("service exploded")
                    }),
            )
            .unwrap()
            .build();
        Dispatcher::new(SerializerRegistry::builtin(), Arc::new(services))
    }

    fn request_command(
        dispatcher: &Dispatcher,
        interface: &str,
        method: &str,
        arg: &str,
    ) -> Command {
        let args = encode_args(&[dispatcher
            .registry
            .serialize(&arg.to_string())
            .unwrap()])
        .unwrap();
        let request = RpcRequest::new(interface, method, args);
        let payload = dispatcher.registry.serialize(&request).unwrap();
        Command::request(next_request_id(), payload)
    }

    fn response_header(command: &Command) -> &wirerpc_common::protocol::ResponseHeader {
        match &command.header {
            Header::Response(header) => header,
            Header::Request(_) => panic!("expected response header"),
        }
    }

    #[test]
    fn test_successful_dispatch() {
        let dispatcher = hello_dispatcher();
        let request = request_command(&dispatcher, "HelloService", "hello", "Master MQ");
        let response = dispatcher.dispatch(&request);

        assert_eq!(response.request_id(), request.request_id());
        assert!(response_header(&response).code.is_success());
        let result: String = dispatcher.registry.deserialize(&response.payload).unwrap();
        assert_eq!(result, "Hello, Master MQ");
    }

    #[test]
    fn test_unknown_service() {
        let dispatcher = hello_dispatcher();
        let request = request_command(&dispatcher, "NoSuchService", "hello", "x");
        let response = dispatcher.dispatch(&request);
        let header = response_header(&response);

        assert_eq!(header.code, Code::NoService);
        assert!(header.error.as_deref().unwrap().contains("no such service"));
    }

    #[test]
    fn test_unknown_method() {
        let dispatcher = hello_dispatcher();
        let request = request_command(&dispatcher, "HelloService", "goodbye", "x");
        let response = dispatcher.dispatch(&request);
        let header = response_header(&response);

        assert_eq!(header.code, Code::NoMethod);
        assert!(header.error.as_deref().unwrap().contains("no such method"));
    }

    #[test]
    fn test_service_failure_carries_message() {
        let dispatcher = hello_dispatcher();
        let request = request_command(&dispatcher, "HelloService", "boom", "x");
        let response = dispatcher.dispatch(&request);
        let header = response_header(&response);

        assert_eq!(header.code, Code::Failure);
        assert_eq!(header.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_service_panic_becomes_error_response() {
        let dispatcher = hello_dispatcher();
        let request = request_command(&dispatcher, "HelloService", "panic", "x");
        let response = dispatcher.dispatch(&request);
        let header = response_header(&response);

        assert_eq!(header.code, Code::Failure);
        assert!(header.error.as_deref().unwrap().contains("service exploded"));

        // The dispatcher keeps serving after a panic.
        let request = request_command(&dispatcher, "HelloService", "hello", "again");
        let response = dispatcher.dispatch(&request);
        assert!(response_header(&response).code.is_success());
    }

    #[test]
    fn test_garbage_payload_is_failure_response() {
        let dispatcher = hello_dispatcher();
        let request = Command::request(next_request_id(), vec![250, 0, 1]);
        let response = dispatcher.dispatch(&request);
        let header = response_header(&response);

        assert_eq!(header.code, Code::Failure);
        assert!(header
            .error
            .as_deref()
            .unwrap()
            .contains("invalid request payload"));
    }

    #[test]
    fn test_malformed_args_is_bad_arguments() {
        let dispatcher = hello_dispatcher();
        // Valid RpcRequest whose args field is a truncated envelope.
        let request = RpcRequest::new("HelloService", "hello", vec![2, 0]);
        let payload = dispatcher.registry.serialize(&request).unwrap();
        let response = dispatcher.dispatch(&Command::request(next_request_id(), payload));

        assert_eq!(response_header(&response).code, Code::BadArguments);
    }

    #[test]
    fn test_error_responses_keep_error_kind_distinct() {
        // A client mapping nonzero codes sees RemoteError, not a transport
        // fault.
        let dispatcher = hello_dispatcher();
        let request = request_command(&dispatcher, "HelloService", "boom", "x");
        let response = dispatcher.dispatch(&request);
        let header = response_header(&response);
        let err = RpcError::Remote(header.error.clone().unwrap());
        assert!(matches!(err, RpcError::Remote(_)));
    }
}
