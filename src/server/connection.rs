//! Connection handling for [`FrameServer`](super::FrameServer).
//!
//! Each accepted stream becomes a [`ConnectionHandle`] that is registered,
//! greeted, served until it closes or faults, and then retired: removed from
//! the registry and closed. Retirement happens on every exit path, including
//! a panic inside the handler.

use std::{future::Future, net::SocketAddr, sync::Arc};

use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::{net::TcpStream, select};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{ServerSettings, dispatch};
use crate::{
    connection::{ConnectionError, ConnectionHandle},
    message::now,
    metrics,
    panic::format_panic,
    protocol::{Reply, Welcome},
    session::{ConnectionId, SessionRegistry},
    stats::ServerStatistics,
};

/// State shared by the accept loops and every connection task.
#[derive(Debug)]
pub(in crate::server) struct ServerContext {
    pub settings: ServerSettings,
    pub registry: Arc<SessionRegistry>,
    pub stats: Arc<ServerStatistics>,
    pub shutdown: CancellationToken,
}

/// Spawn a task to serve a single TCP connection, logging and discarding any
/// panics.
pub(in crate::server) fn spawn_connection_task(
    stream: TcpStream,
    peer_addr: SocketAddr,
    context: Arc<ServerContext>,
    tracker: &TaskTracker,
) {
    let cleanup = Arc::clone(&context);
    spawn_guarded(
        tracker,
        peer_addr,
        async move { process_stream(stream, peer_addr, &context).await },
        async move { retire(&cleanup, ConnectionId::new(peer_addr)).await },
    );
}

/// Run `task` on `tracker`, catching a panic and running `on_panic` after it.
pub(in crate::server) fn spawn_guarded<T, P>(
    tracker: &TaskTracker,
    peer_addr: SocketAddr,
    task: T,
    on_panic: P,
) where
    T: Future<Output = ()> + Send + 'static,
    P: Future<Output = ()> + Send + 'static,
{
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(task).catch_unwind();

        if let Err(panic) = fut.await {
            metrics::inc_connection_panics();
            let panic_msg = format_panic(panic);
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr}");
            tracing::error!(panic = %panic_msg, %peer_addr, "connection task panicked");
            on_panic.await;
        }
    });
}

async fn process_stream(stream: TcpStream, peer_addr: SocketAddr, context: &ServerContext) {
    let handle = Arc::new(ConnectionHandle::with_peer(
        stream,
        peer_addr,
        context.settings.max_frame_length,
    ));
    let id = handle.id();
    if !context.registry.register(Arc::clone(&handle)) {
        warn!("duplicate connection id, dropping connection: peer_addr={id}");
        handle.close().await;
        return;
    }
    metrics::inc_connections();
    info!(
        "client connected: peer_addr={id}, connected_clients={}",
        context.registry.len()
    );

    let reason = serve(&handle, context).await;
    log_disconnect(id, handle.message_count(), &reason);
    retire(context, id).await;
}

/// Greet the peer, then receive and dispatch messages until the connection
/// ends. Returns the reason it ended.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn serve(handle: &ConnectionHandle, context: &ServerContext) -> ConnectionError {
    if let Some(greeting) = &context.settings.greeting {
        let welcome = Reply::Welcome(Welcome {
            client_id: handle.id().to_string(),
            message: greeting.to_string(),
            timestamp: now(),
        });
        if let Err(e) = dispatch::send_reply(handle, &welcome, None).await {
            return e;
        }
    }

    loop {
        let received = select! {
            biased;

            () = context.shutdown.cancelled() => Err(ConnectionError::ConnectionClosed),
            res = handle.receive_one() => res,
        };
        let message = match received {
            Ok(message) => message,
            Err(e) => return e,
        };
        context.stats.record_message();
        if let Err(e) = dispatch::dispatch(handle, message, context).await {
            return e;
        }
    }
}

fn log_disconnect(id: ConnectionId, messages: u64, reason: &ConnectionError) {
    match reason {
        ConnectionError::ConnectionClosed => {
            debug!("client disconnected: peer_addr={id}, messages={messages}");
        }
        ConnectionError::Codec(e) => {
            metrics::inc_errors();
            warn!("closing connection after framing fault: peer_addr={id}, error={e}");
        }
        ConnectionError::SendFailed(e) | ConnectionError::ReceiveFailed(e) => {
            metrics::inc_errors();
            warn!("closing connection after I/O error: peer_addr={id}, error={e}");
        }
    }
}

/// Remove `id` from the registry and close its transport.
///
/// Only the call that actually removes the handle closes it, so concurrent
/// or repeated calls are harmless.
async fn retire(context: &ServerContext, id: ConnectionId) {
    if let Some(handle) = context.registry.unregister(&id) {
        metrics::dec_connections();
        handle.close().await;
        info!(
            "client removed: peer_addr={id}, connected_clients={}",
            context.registry.len()
        );
    }
}
