//! Harness running a [`FrameServer`] on an ephemeral port.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use framelink::{
    Client,
    ClientError,
    FrameServer,
    ServerError,
    ServerStatistics,
    SessionRegistry,
    server::Unbound,
};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{TestResult, unused_listener};

/// How long [`TestServer::shutdown`] waits for the server to stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running server and the means to stop it.
pub struct TestServer {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    stats: Arc<ServerStatistics>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Start a server with default settings and a single accept task.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops before it is
    /// ready.
    pub async fn start() -> TestResult<Self> { Self::start_with(|server| server).await }

    /// Start a server after applying `configure` to the default builder.
    ///
    /// # Errors
    ///
    /// As for [`start`](Self::start).
    pub async fn start_with<F>(configure: F) -> TestResult<Self>
    where
        F: FnOnce(FrameServer<Unbound>) -> FrameServer<Unbound>,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let server = configure(FrameServer::new().workers(1))
            .ready_signal(ready_tx)
            .bind_existing_listener(unused_listener()?)?;
        let addr = server
            .local_addr()
            .ok_or("bound server reported no address")?;
        let registry = server.registry();
        let stats = server.statistics();

        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        ready_rx.await.map_err(|_| "server stopped before becoming ready")?;

        Ok(Self {
            addr,
            registry,
            stats,
            stop: Some(stop),
            task,
        })
    }

    /// Address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// The server's session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry { &self.registry }

    /// The server's statistics.
    #[must_use]
    pub fn statistics(&self) -> &ServerStatistics { &self.stats }

    /// Connect a [`Client`] with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the connection is refused.
    pub async fn connect(&self) -> Result<Client, ClientError> {
        Client::builder().connect(self.addr).await
    }

    /// Wait until the registry holds exactly `count` connections.
    ///
    /// # Errors
    ///
    /// Returns an error if that does not happen within five seconds.
    pub async fn wait_for_clients(&self, count: usize) -> TestResult {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.registry.len() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .map_err(|_| {
            format!(
                "expected {count} registered connections, found {}",
                self.registry.len()
            )
        })?;
        Ok(())
    }

    /// Signal shutdown and wait for the server to stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails or does not stop in time.
    pub async fn shutdown(mut self) -> TestResult {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.task)
            .await
            .map_err(|_| "server did not stop in time")???;
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) { self.task.abort(); }
}
