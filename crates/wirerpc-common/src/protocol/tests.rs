//! Unit tests for the protocol module: command construction, request
//! encoding, and request-ID generation.

use super::*;
use std::collections::HashSet;

#[test]
fn test_request_command_construction() {
    let command = Command::request(7, vec![1, 2, 3]);
    assert_eq!(command.request_id(), 7);
    assert_eq!(command.header.version(), PROTOCOL_VERSION);
    assert_eq!(command.payload, vec![1, 2, 3]);
    assert!(matches!(command.header, Header::Request(_)));
}

#[test]
fn test_success_response_construction() {
    let command = Command::success(9, b"ok".to_vec());
    match &command.header {
        Header::Response(h) => {
            assert_eq!(h.request_id, 9);
            assert!(h.code.is_success());
            assert!(h.error.is_none());
        }
        Header::Request(_) => panic!("expected response header"),
    }
}

#[test]
fn test_error_response_construction() {
    let command = Command::error(11, Code::NoService, "no such service: Foo");
    match &command.header {
        Header::Response(h) => {
            assert_eq!(h.code, Code::NoService);
            assert_eq!(h.error.as_deref(), Some("no such service: Foo"));
        }
        Header::Request(_) => panic!("expected response header"),
    }
    assert!(command.payload.is_empty());
}

#[test]
fn test_code_wire_round_trip() {
    for code in [
        Code::Success,
        Code::Failure,
        Code::NoService,
        Code::NoMethod,
        Code::BadArguments,
        Code::Other(200),
    ] {
        assert_eq!(Code::from_wire(code.to_wire()), code);
    }
}

#[test]
fn test_unknown_code_is_error_not_fault() {
    let code = Code::from_wire(77);
    assert_eq!(code, Code::Other(77));
    assert!(!code.is_success());
}

#[test]
fn test_rpc_request_round_trip() {
    let request = RpcRequest::new("HelloService", "hello", vec![0, 5, 1, 2, 3]);
    let encoded = request.encode().unwrap();
    let decoded = RpcRequest::decode(&encoded).unwrap();
    assert_eq!(decoded, request);
    assert_eq!(decoded.interface_name(), "HelloService");
    assert_eq!(decoded.method_name(), "hello");
    assert_eq!(decoded.args(), &[0, 5, 1, 2, 3]);
}

#[test]
fn test_rpc_request_empty_args() {
    let request = RpcRequest::new("Svc", "ping", Vec::new());
    let decoded = RpcRequest::decode(&request.encode().unwrap()).unwrap();
    assert_eq!(decoded.args(), &[] as &[u8]);
}

#[test]
fn test_rpc_request_truncated_fails() {
    let request = RpcRequest::new("HelloService", "hello", vec![1, 2, 3]);
    let encoded = request.encode().unwrap();
    for cut in [0, 1, 5, encoded.len() - 1] {
        let err = RpcRequest::decode(&encoded[..cut]).unwrap_err();
        assert!(matches!(err, RpcError::Serialization(_)), "cut at {cut}");
    }
}

#[test]
fn test_rpc_request_trailing_bytes_fail() {
    let mut encoded = RpcRequest::new("Svc", "m", vec![]).encode().unwrap();
    encoded.push(0xff);
    assert!(matches!(
        RpcRequest::decode(&encoded),
        Err(RpcError::Serialization(_))
    ));
}

#[test]
fn test_request_id_uniqueness() {
    let ids: HashSet<_> = (0..1000).map(|_| next_request_id()).collect();
    assert_eq!(ids.len(), 1000, "all request IDs should be unique");
}

#[test]
fn test_request_id_uniqueness_under_contention() {
    use std::sync::{Arc, Mutex};
    use std::thread;

    let ids = Arc::new(Mutex::new(HashSet::new()));
    let mut handles = vec![];

    for _ in 0..10 {
        let ids = ids.clone();
        handles.push(thread::spawn(move || {
            let local: Vec<_> = (0..1000).map(|_| next_request_id()).collect();
            let mut ids = ids.lock().unwrap();
            for id in local {
                assert!(ids.insert(id), "request ID {id} generated twice");
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(ids.lock().unwrap().len(), 10_000);
}
