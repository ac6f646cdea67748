//! Builder for configuring and connecting a framelink client.

use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpSocket;

use super::{Client, ClientError};
use crate::codec::{DEFAULT_MAX_FRAME_LENGTH, clamp_frame_length};

/// How long [`Client::request`] waits for a reply unless told otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the channel carrying messages no request is waiting for.
pub const DEFAULT_INCOMING_CAPACITY: usize = 64;

/// Builder for [`Client`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use framelink::client::ClientBuilder;
///
/// let builder = ClientBuilder::new()
///     .request_timeout(Duration::from_secs(5))
///     .incoming_capacity(16);
/// assert_eq!(builder.timeout(), Duration::from_secs(5));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ClientBuilder {
    pub(crate) request_timeout: Duration,
    pub(crate) incoming_capacity: usize,
    pub(crate) max_frame_length: usize,
    pub(crate) nodelay: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self { Self::new() }
}

impl ClientBuilder {
    /// Create a builder with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            incoming_capacity: DEFAULT_INCOMING_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            nodelay: true,
        }
    }

    /// Default timeout for request/response calls.
    ///
    /// A zero duration is raised to one millisecond.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Capacity of the unsolicited message channel. Minimum 1.
    #[must_use]
    pub fn incoming_capacity(mut self, capacity: usize) -> Self {
        self.incoming_capacity = capacity.max(1);
        self
    }

    /// Largest payload accepted or sent, clamped like the server's limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use framelink::{client::ClientBuilder, codec::MIN_FRAME_LENGTH};
    ///
    /// let builder = ClientBuilder::new().max_frame_length(1);
    /// assert_eq!(builder.frame_length_limit(), MIN_FRAME_LENGTH);
    /// ```
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = clamp_frame_length(length);
        self
    }

    /// Configure `TCP_NODELAY` for the connection. Enabled by default.
    #[must_use]
    pub const fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Configured request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration { self.request_timeout }

    /// Configured frame length limit.
    #[must_use]
    pub const fn frame_length_limit(&self) -> usize { self.max_frame_length }

    /// Connect to `addr` and start the receive task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the socket cannot be created
    /// or the connection is refused.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::net::SocketAddr;
    ///
    /// use framelink::client::ClientBuilder;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), framelink::ClientError> {
    /// let addr: SocketAddr = "127.0.0.1:9999".parse().expect("valid socket address");
    /// let client = ClientBuilder::new().connect(addr).await?;
    /// client.disconnect().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(self, addr: SocketAddr) -> Result<Client, ClientError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ClientError::ConnectFailed)?;
        socket
            .set_nodelay(self.nodelay)
            .map_err(ClientError::ConnectFailed)?;
        let stream = socket
            .connect(addr)
            .await
            .map_err(ClientError::ConnectFailed)?;
        tracing::debug!(peer = %addr, "connected");
        Ok(Client::start(stream, addr, self))
    }
}
