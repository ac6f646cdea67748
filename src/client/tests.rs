//! Tests for the client engine against a live server and scripted peers.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use rstest::rstest;
use serde_json::{Map, json};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};

use super::*;
use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, read_message, write_message},
    message::Message,
    protocol::kind,
    server::test_util::{bind_server, free_listener},
};

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.stop.send(());
        self.task.await.expect("server task");
    }
}

fn start_server() -> Running {
    let server = bind_server(free_listener());
    let addr = server.local_addr().expect("bound address");
    let (stop, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        server
            .run_with_shutdown(async {
                let _ = rx.await;
            })
            .await
            .expect("server run");
    });
    Running { addr, stop, task }
}

/// A peer that accepts one connection and hands the raw stream to `script`.
async fn scripted_peer<F, Fut>(script: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        script(stream).await;
    });
    (addr, task)
}

#[tokio::test]
async fn welcome_arrives_on_incoming_channel() {
    let server = start_server();
    let client = Client::builder().connect(server.addr).await.expect("connect");
    let mut incoming = client.take_incoming().expect("first take");
    assert!(client.take_incoming().is_none());

    let welcome = incoming.recv().await.expect("welcome");
    assert_eq!(welcome.kind(), kind::WELCOME);
    assert!(welcome.request_id().is_none());

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn ping_returns_matching_pong() {
    let server = start_server();
    let client = Client::builder().connect(server.addr).await.expect("connect");

    let pong = client.ping().await.expect("pong");
    assert!(pong.ping_time().is_some_and(|sent| pong.pong_timestamp >= sent));
    assert_eq!(client.pending_requests(), 0);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn concurrent_requests_resolve_by_request_id() {
    let server = start_server();
    let client = Arc::new(Client::builder().connect(server.addr).await.expect("connect"));

    let calls = (0..16).map(|n| {
        let client = Arc::clone(&client);
        tokio::spawn(async move { (n, client.echo(format!("message {n}")).await) })
    });
    for call in futures::future::join_all(calls).await {
        let (n, reply) = call.expect("join");
        assert_eq!(reply.expect("echo").content, format!("message {n}"));
    }
    assert_eq!(client.pending_requests(), 0);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn unknown_type_is_answered_with_error_reply() {
    let server = start_server();
    let client = Client::builder().connect(server.addr).await.expect("connect");

    let mut fields = Map::new();
    fields.insert("payload".into(), json!(1));
    let reply = client.send_custom("frobnicate", fields).await.expect("reply");
    assert_eq!(reply.kind(), kind::ERROR);
    assert_eq!(reply.get_str("original_type"), Some("frobnicate"));

    // The connection is still usable.
    client.ping().await.expect("pong after error");

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn timeout_clears_pending_entry_and_late_reply_goes_to_incoming() {
    let (addr, peer) = scripted_peer(|mut stream| async move {
        let request = read_message(&mut stream, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .expect("request");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut reply = Message::new(kind::PONG);
        reply.set_request_id(request.request_id());
        write_message(&mut stream, &reply, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .expect("late reply");
        // Hold the connection open until the client leaves.
        let _ = read_message(&mut stream, DEFAULT_MAX_FRAME_LENGTH).await;
    })
    .await;
    let client = Client::builder().connect(addr).await.expect("connect");
    let mut incoming = client.take_incoming().expect("incoming");

    let err = client
        .request(Message::new(kind::PING), Duration::from_millis(50))
        .await
        .expect_err("no reply in time");
    assert!(matches!(err, ClientError::RequestTimeout(_)));
    assert_eq!(client.pending_requests(), 0);
    assert!(client.is_connected());

    let late = tokio::time::timeout(Duration::from_secs(5), incoming.recv())
        .await
        .expect("late reply delivered")
        .expect("channel open");
    assert_eq!(late.kind(), kind::PONG);
    assert_eq!(late.request_id(), Some(1));

    client.disconnect().await;
    peer.await.expect("peer task");
}

#[tokio::test]
async fn peer_close_fails_waiting_requests() {
    let (addr, peer) = scripted_peer(|mut stream| async move {
        let _ = read_message(&mut stream, DEFAULT_MAX_FRAME_LENGTH).await;
    })
    .await;
    let client = Client::builder().connect(addr).await.expect("connect");

    let err = client
        .request(Message::new(kind::PING), Duration::from_secs(5))
        .await
        .expect_err("peer hung up");
    assert!(matches!(err, ClientError::ConnectionLost));
    assert_eq!(client.pending_requests(), 0);

    peer.await.expect("peer task");
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.is_connected() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("client notices close");
    assert!(matches!(
        client.ping().await,
        Err(ClientError::NotConnected)
    ));
}

#[rstest]
#[case::once(1)]
#[case::repeated(3)]
#[tokio::test]
async fn disconnect_is_idempotent(#[case] times: usize) {
    let server = start_server();
    let client = Client::builder().connect(server.addr).await.expect("connect");
    for _ in 0..times {
        client.disconnect().await;
    }
    assert!(!client.is_connected());
    assert!(matches!(
        client.send(Message::new(kind::PING)).await,
        Err(ClientError::NotConnected)
    ));
    server.stop().await;
}

#[tokio::test]
async fn oversized_request_is_rejected_locally() {
    let (addr, peer) = scripted_peer(|mut stream| async move {
        let _ = read_message(&mut stream, DEFAULT_MAX_FRAME_LENGTH).await;
    })
    .await;
    let client = Client::builder()
        .max_frame_length(64)
        .connect(addr)
        .await
        .expect("connect");

    let err = client.echo("x".repeat(256)).await.expect_err("too large");
    assert!(matches!(
        err,
        ClientError::Codec(crate::codec::CodecError::FrameTooLarge { max: 64, .. })
    ));
    assert_eq!(client.pending_requests(), 0);
    assert!(client.is_connected());

    client.disconnect().await;
    peer.await.expect("peer task");
}
