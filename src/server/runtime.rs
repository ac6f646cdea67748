//! Runtime control for [`FrameServer`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::{Future, future::join_all};
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, FrameServer, ServerError, connection::ServerContext};

impl FrameServer<Bound> {
    /// Serve until Ctrl-C.
    ///
    /// ```no_run
    /// use framelink::server::FrameServer;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), framelink::server::ServerError> {
    /// FrameServer::new()
    ///     .greeting("hello from the lab box")
    ///     .bind(([0, 0, 0, 0], 9999).into())?
    ///     .run()
    ///     .await
    /// # }
    /// ```
    ///
    /// Only a bound server can run:
    ///
    /// ```compile_fail
    /// # async fn f() {
    /// let _ = framelink::server::FrameServer::new().run().await;
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Never fails once bound; accept errors are retried with back-off.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// When it does, accepting stops and every registered connection is
    /// closed. Returns after the last connection task has finished, so
    /// connected peers have all seen EOF by then.
    ///
    /// ```
    /// use framelink::server::FrameServer;
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let (ready_tx, ready_rx) = oneshot::channel();
    /// let (stop_tx, stop_rx) = oneshot::channel::<()>();
    /// let server = FrameServer::new()
    ///     .ready_signal(ready_tx)
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    /// let addr = server.local_addr().ok_or("unbound")?;
    /// let task = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = stop_rx.await;
    /// }));
    ///
    /// ready_rx.await?;
    /// let client = framelink::Client::connect(addr).await?;
    /// client.ping().await?;
    /// client.disconnect().await;
    ///
    /// let _ = stop_tx.send(());
    /// task.await??;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// As for [`FrameServer::run`].
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let FrameServer {
            workers,
            settings,
            registry,
            stats,
            ready_tx,
            backoff_config,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let context = Arc::new(ServerContext {
            settings,
            registry: Arc::clone(&registry),
            stats,
            shutdown: shutdown_token.clone(),
        });

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                AcceptLoopOptions {
                    context: Arc::clone(&context),
                    tracker: tracker.clone(),
                    backoff: backoff_config,
                },
            ));
        }
        let local_addr = listener.local_addr().ok();
        info!("server listening: local_addr={local_addr:?}, workers={workers}");

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => {},
            () = tracker.wait() => {},
        }

        shutdown_token.cancel();
        let open = registry.snapshot();
        info!("shutting down: open_connections={}", open.len());
        join_all(open.iter().map(|handle| handle.close())).await;

        tracker.close();
        tracker.wait().await;
        info!("server stopped: local_addr={local_addr:?}");
        Ok(())
    }
}
