//! Transport-level tests against a raw TCP peer: correlation, timeouts,
//! connection loss, and lifecycle enforcement.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::protocol::{next_request_id, Command, RpcError};

use super::codec::{decode_command, encode_command};
use super::connection::{ConnectionState, Transport, TransportConfig};
use super::frame::{read_frame, write_frame};

fn short_timeouts() -> TransportConfig {
    TransportConfig {
        request_timeout: Duration::from_millis(200),
        sweep_interval: Duration::from_millis(20),
    }
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn read_request(stream: &mut TcpStream) -> Command {
    let bytes = read_frame(stream).await.unwrap().expect("peer closed");
    decode_command(&bytes).unwrap()
}

async fn write_command(stream: &mut TcpStream, command: &Command) {
    write_frame(stream, &encode_command(command)).await.unwrap();
}

#[tokio::test]
async fn test_responses_correlate_out_of_order() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let first = read_request(&mut stream).await;
        let second = read_request(&mut stream).await;
        // Answer in reverse arrival order.
        write_command(&mut stream, &Command::success(second.request_id(), b"two".to_vec())).await;
        write_command(&mut stream, &Command::success(first.request_id(), b"one".to_vec())).await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let future_one = transport
        .send(Command::request(next_request_id(), vec![1]))
        .unwrap();
    let future_two = transport
        .send(Command::request(next_request_id(), vec![2]))
        .unwrap();

    let (one, two) = tokio::join!(future_one, future_two);
    assert_eq!(one.unwrap().payload, b"one");
    assert_eq!(two.unwrap().payload, b"two");
    assert_eq!(transport.pending_count(), 0);
}

#[tokio::test]
async fn test_timeout_reclaims_pending_entry() {
    let (listener, addr) = bind().await;

    // Accept and read, but never answer.
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let transport = Transport::connect_with(&addr, short_timeouts()).await.unwrap();
    let future = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();

    match future.await {
        Err(RpcError::Timeout(_)) => {}
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(transport.pending_count(), 0);
    // The connection itself stays usable after a single call times out.
    assert_eq!(transport.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_late_response_after_timeout_is_discarded() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let first = read_request(&mut stream).await;
        // Too late for the first call.
        tokio::time::sleep(Duration::from_millis(400)).await;
        write_command(&mut stream, &Command::success(first.request_id(), b"late".to_vec())).await;
        // Prompt answer for the second call.
        let second = read_request(&mut stream).await;
        write_command(&mut stream, &Command::success(second.request_id(), b"fresh".to_vec()))
            .await;
    });

    let transport = Transport::connect_with(&addr, short_timeouts()).await.unwrap();
    let future = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();
    assert!(matches!(future.await, Err(RpcError::Timeout(_))));

    // Give the late response time to arrive and be dropped.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.pending_count(), 0);

    let response = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.payload, b"fresh");
}

#[tokio::test]
async fn test_duplicate_response_resolves_once() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = Command::success(request.request_id(), b"only".to_vec());
        write_command(&mut stream, &response).await;
        write_command(&mut stream, &response).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let response = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.payload, b"only");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.pending_count(), 0);
    assert_eq!(transport.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_unsolicited_response_is_discarded() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // A response nobody asked for.
        write_command(&mut stream, &Command::success(0xDEAD, b"stray".to_vec())).await;
        let request = read_request(&mut stream).await;
        write_command(&mut stream, &Command::success(request.request_id(), b"mine".to_vec()))
            .await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let response = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.payload, b"mine");
}

#[tokio::test]
async fn test_connection_loss_fails_outstanding_requests() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await;
        // Drop the connection with the call still outstanding.
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let future = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();

    match future.await {
        Err(RpcError::Transport(_)) => {}
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(transport.pending_count(), 0);
    assert_eq!(transport.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await;
        // Garbage that passes framing but not the codec.
        write_frame(&mut stream, &[0xFF, 0xFF, 0xFF]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let future = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();

    assert!(matches!(future.await, Err(RpcError::Transport(_))));
    assert_eq!(transport.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let _stream = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    assert_eq!(transport.state(), ConnectionState::Connected);
    transport.close();
    assert_eq!(transport.state(), ConnectionState::Closed);

    let err = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
}

#[tokio::test]
async fn test_close_fails_outstanding_requests() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let _stream = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let future = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();
    transport.close();

    assert!(matches!(future.await, Err(RpcError::Transport(_))));
    assert_eq!(transport.pending_count(), 0);
}

#[tokio::test]
async fn test_connect_refused() {
    // Bind then drop to get a port with nothing listening.
    let (listener, addr) = bind().await;
    drop(listener);

    let err = Transport::connect(&addr).await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
}

#[tokio::test]
async fn test_abandoning_future_leaves_other_calls_intact() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let first = read_request(&mut stream).await;
        let second = read_request(&mut stream).await;
        write_command(&mut stream, &Command::success(first.request_id(), b"a".to_vec())).await;
        write_command(&mut stream, &Command::success(second.request_id(), b"b".to_vec())).await;
    });

    let transport = Transport::connect(&addr).await.unwrap();
    let abandoned = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();
    let kept = transport
        .send(Command::request(next_request_id(), vec![]))
        .unwrap();
    drop(abandoned);

    assert_eq!(kept.await.unwrap().payload, b"b");
}
