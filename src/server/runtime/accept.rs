//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::task::TaskTracker;

use super::backoff::BackoffConfig;
use crate::server::{
    ServerError,
    connection::{ServerContext, spawn_connection_task},
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub context: Arc<ServerContext>,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accepts incoming connections and spawns a handler task for each.
///
/// Failures to accept back off exponentially as governed by `backoff`; a
/// successful accept resets the delay. The loop terminates when the
/// context's shutdown token is cancelled, including while backing off.
/// Handler tasks are tracked by `tracker` for graceful shutdown.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let AcceptLoopOptions {
        context,
        tracker,
        backoff,
    } = options;
    let backoff = backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let mut delay = backoff.initial_delay;
    while let Some(next_delay) =
        accept_iteration(listener.as_ref(), &context, &tracker, &backoff, delay).await
    {
        delay = next_delay;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &L,
    context: &Arc<ServerContext>,
    tracker: &TaskTracker,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener,
{
    let accepted = select! {
        biased;

        () = context.shutdown.cancelled() => return None,
        res = listener.accept() => res,
    };
    match accepted {
        Ok((stream, peer_addr)) => {
            spawn_connection_task(stream, peer_addr, Arc::clone(context), tracker);
            Some(backoff.initial_delay)
        }
        Err(e) => {
            let local_addr = listener.local_addr().ok();
            let error = ServerError::Accept(e);
            warn!("{error}: local_addr={local_addr:?}, retry_in={delay:?}");
            select! {
                biased;

                () = context.shutdown.cancelled() => None,
                () = sleep(delay) => Some(backoff.next_delay(delay)),
            }
        }
    }
}
