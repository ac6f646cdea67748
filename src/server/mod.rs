//! Tokio-based server speaking the framed message protocol.
//!
//! `FrameServer` accepts TCP connections, registers each one in a shared
//! [`SessionRegistry`] and spawns a task that decodes frames and dispatches
//! them by `type` until the peer disconnects or the server shuts down.

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{session::SessionRegistry, stats::ServerStatistics};

/// Greeting sent in the `welcome` message unless configured otherwise.
pub const DEFAULT_GREETING: &str = "Welcome to the framelink server";

/// Value of `echoed_by` in `echo_response` replies unless configured otherwise.
pub const DEFAULT_ECHO_MARKER: &str = "framelink server";

/// Tokio-based server for the framed message protocol.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`FrameServer::bind`] or
/// [`FrameServer::bind_existing_listener`] before running. One accept task is
/// spawned per worker; every accepted connection gets its own handler task.
pub struct FrameServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) workers: usize,
    pub(crate) settings: ServerSettings,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) stats: Arc<ServerStatistics>,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new `ready_tx` must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Per-connection behaviour shared by every handler task.
#[derive(Clone, Debug)]
pub(crate) struct ServerSettings {
    pub greeting: Option<Arc<str>>,
    pub echo_marker: Arc<str>,
    pub max_frame_length: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            greeting: Some(Arc::from(DEFAULT_GREETING)),
            echo_marker: Arc::from(DEFAULT_ECHO_MARKER),
            max_frame_length: crate::codec::DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
mod connection;
mod dispatch;
pub mod error;
mod runtime;

pub use error::ServerError;
/// Re-exported configuration types for server backoff behaviour.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
