use std::sync::Arc;
use std::time::Duration;

use ringway_rpc::{Code, Connection, ErrorCode, Message, Request, Server, MAX_FRAME_SIZE};

async fn no_calls(_request: Request) -> Message {
    Message::response(Code::NotImplemented, "")
}

#[tokio::test]
async fn test_connect_refused() {
    let addr = test_helper::get_unused_addr();
    let res = Connection::connect(addr, Arc::new(no_calls)).await;
    assert!(res.is_err(), "Nothing is listening on the address.");
}

#[tokio::test]
async fn test_call_after_close() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = test_helper::get_unused_addr();
    let server = Server::listen(addr, Arc::new(no_calls)).await.unwrap();

    let client = Connection::connect(addr, Arc::new(no_calls)).await.unwrap();
    let resp = client.call(&Message::request(Code::Get, "/")).await.unwrap();
    assert_eq!(resp.code(), Code::NotImplemented);

    client.close();
    assert!(client.is_closed());

    let err = client
        .call(&Message::request(Code::Get, "/"))
        .await
        .expect_err("Closed connection should reject calls");
    assert_eq!(err.code, ErrorCode::Closed);

    server.shutdown();
}

#[tokio::test]
async fn test_pending_call_fails_when_peer_goes_away() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = test_helper::get_unused_addr();

    // Closes the connection instead of replying.
    let hang_up = |request: Request| async move {
        request.connection().close();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Message::response(Code::Content, "")
    };
    let server = Server::listen(addr, Arc::new(hang_up)).await.unwrap();

    let client = Connection::connect(addr, Arc::new(no_calls)).await.unwrap();
    let err = tokio::time::timeout(
        Duration::from_secs(10),
        client.call(&Message::request(Code::Get, "/")),
    )
    .await
    .expect("Call should fail rather than hang")
    .expect_err("Peer closed the connection");
    assert_eq!(err.code, ErrorCode::Closed);
    assert!(client.is_closed());

    server.shutdown();
}

#[tokio::test]
async fn test_panicking_handler_replies_with_error() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = test_helper::get_unused_addr();

    let panics = |request: Request| async move {
        if request.message().path() == "/panic" {
            panic!("handler exploded");
        }
        Message::response(Code::Content, "fine")
    };
    let server = Server::listen(addr, Arc::new(panics)).await.unwrap();
    let client = Connection::connect(addr, Arc::new(no_calls)).await.unwrap();

    let err = client
        .call(&Message::request(Code::Get, "/panic"))
        .await
        .expect_err("Handler panicked");
    assert_eq!(err.code, ErrorCode::InternalError);

    let resp = client.call(&Message::request(Code::Get, "/ok")).await.unwrap();
    assert_eq!(resp.payload(), b"fine", "Connection should survive a failed handler");

    server.shutdown();
}

#[tokio::test]
async fn test_oversized_call_leaves_connection_usable() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = test_helper::get_unused_addr();

    let slow_echo = |request: Request| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Message::response(Code::Content, request.message().payload())
    };
    let server = Server::listen(addr, Arc::new(slow_echo)).await.unwrap();
    let client = Connection::connect(addr, Arc::new(no_calls)).await.unwrap();

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call(&Message::request(Code::Get, "/small").with_payload(b"hi".to_vec()))
                .await
        })
    };

    let big = Message::request(Code::Put, "/big").with_payload(vec![1u8; MAX_FRAME_SIZE + 1]);
    let err = client.call(&big).await.expect_err("Message exceeds the frame limit");
    assert_eq!(err.code, ErrorCode::InvalidPayload);

    let resp = in_flight.await.unwrap().expect("Concurrent call should be unaffected");
    assert_eq!(resp.payload(), b"hi");
    assert!(!client.is_closed());

    server.shutdown();
}

#[tokio::test]
async fn test_oversized_reply_becomes_error() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = test_helper::get_unused_addr();

    let huge_reply = |request: Request| async move {
        if request.message().path() == "/big" {
            return Message::response(Code::Content, vec![1u8; MAX_FRAME_SIZE + 1]);
        }
        Message::response(Code::Content, "fine")
    };
    let server = Server::listen(addr, Arc::new(huge_reply)).await.unwrap();
    let client = Connection::connect(addr, Arc::new(no_calls)).await.unwrap();

    let err = client
        .call(&Message::request(Code::Get, "/big"))
        .await
        .expect_err("Reply exceeds the frame limit");
    assert_eq!(err.code, ErrorCode::InvalidPayload);

    let resp = client.call(&Message::request(Code::Get, "/ok")).await.unwrap();
    assert_eq!(resp.payload(), b"fine");
    assert!(!client.is_closed());

    server.shutdown();
}
