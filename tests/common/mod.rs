//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use framelink::protocol::kind;
use framelink_testing::{RawPeer, TestResult, TestServer};

/// Connect `count` raw peers and consume each one's welcome.
pub async fn welcomed_peers(server: &TestServer, count: usize) -> TestResult<Vec<RawPeer>> {
    let mut peers = Vec::with_capacity(count);
    for _ in 0..count {
        let mut peer = RawPeer::connect(server.addr()).await?;
        let welcome = peer.recv().await?;
        assert_eq!(welcome.kind(), kind::WELCOME);
        peers.push(peer);
    }
    server.wait_for_clients(count).await?;
    Ok(peers)
}
