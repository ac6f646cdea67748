//! Tests for `SessionRegistry` with live connection handles.

use std::sync::Arc;

use framelink::{
    ConnectionHandle,
    ConnectionId,
    SessionRegistry,
    codec::DEFAULT_MAX_FRAME_LENGTH,
};
use rstest::{fixture, rstest};
use tokio::net::{TcpListener, TcpStream};

#[fixture]
fn registry() -> SessionRegistry { SessionRegistry::new() }

/// Accept one loopback connection and wrap the server side.
async fn handle() -> (Arc<ConnectionHandle>, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (server, _) = accepted.expect("accept");
    let handle = ConnectionHandle::new(server, DEFAULT_MAX_FRAME_LENGTH).expect("handle");
    (Arc::new(handle), client.expect("connect"))
}

#[rstest]
#[tokio::test]
async fn register_and_lookup(registry: SessionRegistry) {
    let (h, _peer) = handle().await;
    let id = h.id();
    assert!(registry.register(Arc::clone(&h)));
    assert_eq!(registry.len(), 1);
    let found = registry.get(&id).expect("registered handle");
    assert!(Arc::ptr_eq(&found, &h));
}

#[rstest]
#[tokio::test]
async fn duplicate_id_is_rejected(registry: SessionRegistry) {
    let (h, _peer) = handle().await;
    assert!(registry.register(Arc::clone(&h)));
    assert!(!registry.register(Arc::clone(&h)));
    assert_eq!(registry.len(), 1);
}

#[rstest]
#[tokio::test]
async fn unregister_removes_once(registry: SessionRegistry) {
    let (h, _peer) = handle().await;
    let id = h.id();
    registry.register(h);
    assert!(registry.unregister(&id).is_some());
    assert!(registry.unregister(&id).is_none());
    assert!(registry.is_empty());
    assert!(registry.get(&id).is_none());
}

#[rstest]
#[tokio::test]
async fn snapshot_is_detached_from_registry(registry: SessionRegistry) {
    let mut peers = Vec::new();
    for _ in 0..3 {
        let (h, peer) = handle().await;
        registry.register(h);
        peers.push(peer);
    }
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 3);

    let ids: Vec<ConnectionId> = snapshot.iter().map(|h| h.id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "snapshot is ordered by id");
    assert_eq!(registry.ids(), ids);

    for id in &ids {
        registry.unregister(id);
    }
    assert!(registry.is_empty());
    assert_eq!(snapshot.len(), 3, "snapshot keeps its handles alive");
}

#[rstest]
#[tokio::test]
async fn concurrent_register_and_unregister(registry: SessionRegistry) {
    let registry = Arc::new(registry);
    let mut handles = Vec::new();
    let mut peers = Vec::new();
    for _ in 0..8 {
        let (h, peer) = handle().await;
        handles.push(h);
        peers.push(peer);
    }

    let tasks = handles.iter().cloned().map(|h| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let id = h.id();
            assert!(registry.register(h));
            tokio::task::yield_now().await;
            assert!(registry.unregister(&id).is_some());
        })
    });
    for task in futures::future::join_all(tasks).await {
        task.expect("task");
    }
    assert!(registry.is_empty());
}

#[test]
fn connection_id_displays_address_and_port() {
    let id = ConnectionId::new(([10, 0, 0, 7], 5150).into());
    assert_eq!(id.to_string(), "10.0.0.7:5150");
}
