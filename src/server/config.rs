//! Configuration utilities for [`FrameServer`].

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{BackoffConfig, FrameServer, ServerSettings, ServerState, Unbound};
use crate::{codec::clamp_frame_length, session::SessionRegistry, stats::ServerStatistics};

pub mod binding;

impl FrameServer<Unbound> {
    /// Create a new, unbound `FrameServer`.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1 if
    /// this cannot be determined). Call [`bind`](Self::bind) before running
    /// the server.
    #[must_use]
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            workers,
            settings: ServerSettings::default(),
            registry: Arc::new(SessionRegistry::new()),
            stats: Arc::new(ServerStatistics::new()),
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            state: Unbound,
        }
    }
}

impl Default for FrameServer<Unbound> {
    fn default() -> Self { Self::new() }
}

impl<S> FrameServer<S>
where
    S: ServerState,
{
    /// Set the number of accept tasks to spawn for the server.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Set the greeting sent in each connection's `welcome` message.
    #[must_use]
    pub fn greeting(mut self, text: impl Into<String>) -> Self {
        self.settings.greeting = Some(Arc::from(text.into()));
        self
    }

    /// Do not send a `welcome` message to new connections.
    #[must_use]
    pub fn without_greeting(mut self) -> Self {
        self.settings.greeting = None;
        self
    }

    /// Set the `echoed_by` marker used in `echo_response` replies.
    #[must_use]
    pub fn echo_marker(mut self, marker: impl Into<String>) -> Self {
        self.settings.echo_marker = Arc::from(marker.into());
        self
    }

    /// Set the maximum payload length accepted or sent on any connection.
    ///
    /// The value is clamped to the codec's supported range.
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.settings.max_frame_length = clamp_frame_length(length);
        self
    }

    /// Configure accept-loop back-off timing.
    ///
    /// The configuration is normalized before use.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff_config = backoff.normalized();
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Returns the configured number of accept tasks.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Returns the configured maximum frame length.
    #[must_use]
    pub fn frame_length_limit(&self) -> usize { self.settings.max_frame_length }

    /// Returns the configured greeting, if any.
    #[must_use]
    pub fn greeting_text(&self) -> Option<&str> { self.settings.greeting.as_deref() }

    /// Returns the configured echo marker.
    #[must_use]
    pub fn echo_marker_text(&self) -> &str { &self.settings.echo_marker }

    /// Returns the configured back-off timing.
    #[must_use]
    pub const fn backoff(&self) -> BackoffConfig { self.backoff_config }

    /// Shared registry of live connections.
    ///
    /// The returned handle stays valid after the server has been consumed by
    /// [`run`](FrameServer::run), which makes it useful for diagnostics.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> { Arc::clone(&self.registry) }

    /// Shared statistics counters.
    #[must_use]
    pub fn statistics(&self) -> Arc<ServerStatistics> { Arc::clone(&self.stats) }
}
