//! Error types for client operations.

use std::{io, time::Duration};

use crate::codec::CodecError;

/// Errors emitted by [`crate::client::Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("failed to connect: {0}")]
    ConnectFailed(#[source] io::Error),
    /// The client was disconnected, locally or by the peer.
    #[error("client is not connected")]
    NotConnected,
    /// No reply arrived within the allotted time.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),
    /// The connection dropped while a request was waiting for its reply.
    #[error("connection lost")]
    ConnectionLost,
    /// Writing to the transport failed.
    #[error("failed to send message: {0}")]
    SendFailed(#[source] io::Error),
    /// A message could not be framed, encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The reply had a different `type` than the request calls for.
    #[error("expected `{expected}` reply, received `{received}`")]
    UnexpectedReply {
        /// Reply type the request calls for.
        expected: String,
        /// Reply type that arrived.
        received: String,
    },
    /// The server answered with an `error` reply.
    #[error("server rejected `{original_type}` message: {message}")]
    Server {
        /// `type` of the rejected message.
        original_type: String,
        /// Reason given by the server.
        message: String,
    },
}

impl ClientError {
    /// Whether retrying on the same client could succeed.
    ///
    /// Timeouts and server-side rejections leave the connection usable;
    /// everything else means the client must reconnect.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout(_) | Self::Server { .. } | Self::UnexpectedReply { .. }
        )
    }

    pub(crate) fn from_send(error: io::Error) -> Self {
        match CodecError::from_io(error) {
            CodecError::Io(io) => Self::SendFailed(io),
            codec => Self::Codec(codec),
        }
    }
}
