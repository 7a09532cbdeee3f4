use std::time::Duration;

use resock_client::{ClientConfig, ClientError, ClientEvent, MessageClient};
use resock_transport::{Endpoint, SocketListener};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn unused_local_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
    listener.local_addr().expect("local addr").port()
}

fn fast_config() -> ClientConfig {
    ClientConfig::default().with_reconnect_delay(Duration::from_millis(20))
}

async fn next(events: &mut UnboundedReceiver<ClientEvent<Value>>) -> ClientEvent<Value> {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("event should arrive in time")
        .expect("event channel should be open")
}

#[tokio::test]
async fn queued_messages_arrive_in_order_exactly_once() {
    let port = unused_local_port();
    let client: MessageClient =
        MessageClient::connect(Endpoint::tcp("127.0.0.1", port), fast_config());
    let (handle, mut events) = client.spawn();

    for text in ["first", "second", "third"] {
        handle.send(json!({ "text": text })).expect("send should queue");
    }

    // Let a few attempts fail before anyone is listening.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("listener should bind the reserved port");
    let (stream, _) = listener.accept().await.expect("client should connect");
    assert!(matches!(next(&mut events).await, ClientEvent::Connected));

    let mut lines = BufReader::new(stream).lines();
    for text in ["first", "second", "third"] {
        let line = lines
            .next_line()
            .await
            .expect("read should succeed")
            .expect("line should arrive");
        let message: Value = serde_json::from_str(&line).expect("line should be json");
        assert_eq!(message, json!({ "text": text }));
    }

    let extra = tokio::time::timeout(Duration::from_millis(200), lines.next_line()).await;
    assert!(extra.is_err(), "no duplicate frames expected");

    handle.destroy();
}

#[tokio::test]
async fn malformed_frame_is_reported_without_dropping_the_connection() {
    let listener = SocketListener::bind(&Endpoint::tcp("127.0.0.1", 0))
        .await
        .expect("listener should bind");
    let client: MessageClient =
        MessageClient::connect(listener.endpoint().clone(), fast_config());
    let (handle, mut events) = client.spawn();

    let mut stream = listener.accept().await.expect("client should connect");
    assert!(matches!(next(&mut events).await, ClientEvent::Connected));

    stream
        .write_all(b"this is not json\n{\"still\":\"alive\"}\n")
        .await
        .expect("server write");

    match next(&mut events).await {
        ClientEvent::Error(err) => assert!(err.is_protocol_violation()),
        other => panic!("expected Error, got {other:?}"),
    }
    match next(&mut events).await {
        ClientEvent::Message(message) => assert_eq!(message, json!({"still": "alive"})),
        other => panic!("expected Message, got {other:?}"),
    }

    handle.send(json!("reply")).expect("send");
    handle.flush().await.expect("flush");
    let mut lines = BufReader::new(stream).lines();
    let line = lines.next_line().await.expect("read").expect("line");
    assert_eq!(line, "\"reply\"");

    handle.destroy();
    loop {
        match next(&mut events).await {
            ClientEvent::Closed => break,
            ClientEvent::Disconnected(err) => panic!("connection dropped: {err}"),
            _ => {}
        }
    }
}

#[tokio::test]
async fn reconnects_and_keeps_sending_after_server_restart() {
    let listener = SocketListener::bind(&Endpoint::tcp("127.0.0.1", 0))
        .await
        .expect("listener should bind");
    let client: MessageClient =
        MessageClient::connect(listener.endpoint().clone(), fast_config());
    let (handle, mut events) = client.spawn();

    let first = listener.accept().await.expect("first accept");
    assert!(matches!(next(&mut events).await, ClientEvent::Connected));
    drop(first);
    assert!(matches!(
        next(&mut events).await,
        ClientEvent::Disconnected(_)
    ));

    let second = listener.accept().await.expect("second accept");
    assert!(matches!(next(&mut events).await, ClientEvent::Connected));

    handle.send(json!({"after": "reconnect"})).expect("send");
    handle.flush().await.expect("flush");
    let mut lines = BufReader::new(second).lines();
    let line = lines.next_line().await.expect("read").expect("line");
    assert_eq!(line, "{\"after\":\"reconnect\"}");

    handle.destroy();
}

#[tokio::test]
async fn destroy_interrupts_a_flush_the_peer_never_drains() {
    let listener = SocketListener::bind(&Endpoint::tcp("127.0.0.1", 0))
        .await
        .expect("listener should bind");
    let client: MessageClient =
        MessageClient::connect(listener.endpoint().clone(), fast_config());
    let (handle, mut events) = client.spawn();

    let _silent_peer = listener.accept().await.expect("client should connect");
    assert!(matches!(next(&mut events).await, ClientEvent::Connected));

    let bulk = "x".repeat(4 * 1024 * 1024);
    for _ in 0..8 {
        handle.send(json!(bulk.as_str())).expect("send");
    }
    let flusher = handle.clone();
    let flush = tokio::spawn(async move { flusher.flush().await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.destroy();

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(ClientEvent::Closed) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await;
    assert_eq!(closed.ok(), Some(true), "Closed should follow destroy");

    let flushed = flush.await.expect("flush task should finish");
    assert!(matches!(flushed, Err(ClientError::InvalidState(_))));
}

#[tokio::test]
async fn dropping_every_handle_closes_the_client() {
    let port = unused_local_port();
    let client: MessageClient =
        MessageClient::connect(Endpoint::tcp("127.0.0.1", port), fast_config());
    let (handle, mut events) = client.spawn();
    let clone = handle.clone();

    drop(handle);
    assert!(!clone.is_destroyed());
    drop(clone);

    assert!(matches!(next(&mut events).await, ClientEvent::Closed));
    let end = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("channel should close");
    assert!(end.is_none());
}

#[tokio::test]
async fn destroyed_handle_rejects_sends() {
    let port = unused_local_port();
    let client: MessageClient =
        MessageClient::connect(Endpoint::tcp("127.0.0.1", port), fast_config());
    let (handle, mut events) = client.spawn();

    handle.destroy();
    handle.destroy();
    assert!(handle.is_destroyed());
    assert!(handle.send(json!(1)).is_err());
    assert!(matches!(next(&mut events).await, ClientEvent::Closed));
}
