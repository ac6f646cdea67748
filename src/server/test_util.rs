//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;
use tokio_util::sync::CancellationToken;

use super::{Bound, FrameServer, ServerSettings, connection::ServerContext};
use crate::{session::SessionRegistry, stats::ServerStatistics};

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

/// Bind a default server to `listener`.
pub fn bind_server(listener: StdTcpListener) -> FrameServer<Bound> {
    FrameServer::new()
        .workers(1)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

#[fixture]
/// Fresh context with default settings and an uncancelled shutdown token.
pub fn context() -> Arc<ServerContext> {
    Arc::new(ServerContext {
        settings: ServerSettings::default(),
        registry: Arc::new(SessionRegistry::new()),
        stats: Arc::new(ServerStatistics::new()),
        shutdown: CancellationToken::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_listener_uses_localhost() {
        let addr = listener_addr(&free_listener());
        assert_eq!(addr.ip(), std::net::IpAddr::from(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn context_starts_empty() {
        let context = context();
        assert!(context.registry.is_empty());
        assert!(!context.shutdown.is_cancelled());
    }
}
