//! Framelink client runtime.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex as StdMutex,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::SinkExt;
use tokio::{
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::Instrument;

use super::{ClientBuilder, ClientError, pending::PendingRequests, receiver::ReceiveLoop};
use crate::{codec::MessageCodec, message::Message};

/// Upper bound on flushing buffered output while disconnecting.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Client for one framelink connection.
///
/// All methods take `&self`, so a client can be shared between tasks behind
/// an `Arc` and issue requests concurrently. Replies are matched to requests
/// by `request_id`, never by arrival order.
///
/// # Examples
///
/// ```no_run
/// use std::net::SocketAddr;
///
/// use framelink::Client;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), framelink::ClientError> {
/// let addr: SocketAddr = "127.0.0.1:9999".parse().expect("valid socket address");
/// let client = Client::builder().connect(addr).await?;
/// let pong = client.ping().await?;
/// println!("round trip via {}", pong.client_id);
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    peer_addr: SocketAddr,
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, MessageCodec>>>,
    pending: Arc<PendingRequests>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
    connection: CancellationToken,
    incoming: StdMutex<Option<mpsc::Receiver<Message>>>,
    receive_task: StdMutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .field("pending_requests", &self.pending.len())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start building a new client.
    #[must_use]
    pub const fn builder() -> ClientBuilder { ClientBuilder::new() }

    /// Connect to `addr` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the connection cannot be
    /// established.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        ClientBuilder::new().connect(addr).await
    }

    /// Split `stream` and spawn the receive task.
    pub(crate) fn start(stream: TcpStream, peer_addr: SocketAddr, config: ClientBuilder) -> Self {
        let (read, write) = stream.into_split();
        let pending = Arc::new(PendingRequests::new());
        let connection = CancellationToken::new();
        let (incoming_tx, incoming_rx) = mpsc::channel(config.incoming_capacity);
        let receive_task = ReceiveLoop {
            reader: FramedRead::new(read, MessageCodec::new(config.max_frame_length)),
            pending: Arc::clone(&pending),
            incoming: incoming_tx,
            connection: connection.clone(),
        }
        .spawn(peer_addr);

        Self {
            peer_addr,
            writer: Mutex::new(Some(FramedWrite::new(
                write,
                MessageCodec::new(config.max_frame_length),
            ))),
            pending,
            next_request_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            connection,
            incoming: StdMutex::new(Some(incoming_rx)),
            receive_task: StdMutex::new(Some(receive_task)),
        }
    }

    /// Address of the server.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer_addr }

    /// Whether the connection is still usable.
    #[must_use]
    pub fn is_connected(&self) -> bool { !self.connection.is_cancelled() }

    /// Number of requests waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.pending.len() }

    /// Default timeout applied by [`request`](Self::request) wrappers.
    #[must_use]
    pub fn request_timeout(&self) -> Duration { self.request_timeout }

    /// Take the receiver of messages no request was waiting for.
    ///
    /// This includes the server's `welcome`, broadcasts from other peers and
    /// replies that arrived after their request timed out. Returns `None`
    /// after the first call. If the receiver is never taken, or falls behind,
    /// surplus messages are dropped with a warning.
    #[must_use]
    pub fn take_incoming(&self) -> Option<mpsc::Receiver<Message>> {
        self.incoming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Send a message without waiting for any reply.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] after a disconnect.
    /// - [`ClientError::Codec`] if the message does not fit in a frame.
    /// - [`ClientError::SendFailed`] if the write fails.
    pub async fn send(&self, message: Message) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(ClientError::NotConnected)?;
        let kind = message.kind().to_owned();
        sink.send(message).await.map_err(|error| {
            let error = ClientError::from_send(error);
            tracing::debug!(%kind, %error, "send failed");
            error
        })
    }

    /// Send `message` with a fresh `request_id` and wait for the reply that
    /// carries the same id.
    ///
    /// Any `request_id` already on `message` is replaced. The reply is
    /// returned as-is, including `error` replies; see the typed helpers such
    /// as [`ping`](Self::ping) for checked variants.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RequestTimeout`] if writing the request and receiving
    ///   its reply take longer than `timeout` together. A reply arriving later is delivered to the incoming channel.
    /// - [`ClientError::ConnectionLost`] if the connection ends first.
    /// - Any error from [`send`](Self::send).
    pub async fn request(
        &self,
        mut message: Message,
        timeout: Duration,
    ) -> Result<Message, ClientError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        message.set_request_id(Some(id));
        let span = tracing::debug_span!("request", request_id = id, kind = message.kind());
        self.exchange(id, message, timeout).instrument(span).await
    }

    async fn exchange(
        &self,
        id: u64,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, ClientError> {
        let (_guard, reply) = self.pending.register(id);
        // Registered before the check so a concurrent `fail_all` cannot miss it.
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        // The deadline spans the write as well as the wait for the reply.
        let exchange = async {
            self.send(message).await?;
            reply.await.map_err(|_| ClientError::ConnectionLost)?
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(?timeout, "request timed out");
                Err(ClientError::RequestTimeout(timeout))
            }
        }
    }

    /// Close the connection.
    ///
    /// Flushes and shuts down the write half, stops the receive task and
    /// fails every pending request with [`ClientError::ConnectionLost`].
    /// Calling this more than once is harmless.
    pub async fn disconnect(&self) {
        self.connection.cancel();
        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            match tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::debug!(%error, "error while disconnecting"),
                Err(_) => tracing::debug!("timed out flushing on disconnect"),
            }
        }
        let task = self
            .receive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(error) = task.await
        {
            tracing::warn!(%error, "client receive task failed");
        }
        self.pending.fail_all(|| ClientError::ConnectionLost);
        tracing::debug!(peer = %self.peer_addr, "disconnected");
    }
}

impl Drop for Client {
    fn drop(&mut self) { self.connection.cancel(); }
}
