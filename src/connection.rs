//! Live handle for one accepted connection.
//!
//! A [`ConnectionHandle`] owns both halves of a TCP stream behind the
//! [`MessageCodec`]. The connection's own handler task drives
//! [`receive_one`](ConnectionHandle::receive_one); any task holding a clone of
//! the `Arc` may [`send`](ConnectionHandle::send) to it or
//! [`close`](ConnectionHandle::close) it. Closing cancels a shared token, so
//! a receive or send blocked on the socket returns promptly instead of
//! waiting for the peer.

use std::{
    io,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    codec::{CodecError, MessageCodec},
    message::{Message, Timestamp, now},
    metrics::{self, Direction},
    session::ConnectionId,
};

/// Upper bound on flushing buffered output while closing.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Faults raised by a [`ConnectionHandle`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer closed at a frame boundary, or the handle was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Writing to the transport failed, or the handle is already closed.
    #[error("failed to send message: {0}")]
    SendFailed(#[source] io::Error),

    /// Reading from the transport failed.
    #[error("failed to receive message: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// The bytes on the wire could not be framed or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ConnectionError {
    /// Whether this represents an orderly close rather than a fault.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::ConnectionClosed) }

    fn from_receive(error: io::Error) -> Self {
        match CodecError::from_io(error) {
            CodecError::Io(io) => Self::ReceiveFailed(io),
            codec => Self::Codec(codec),
        }
    }

    fn from_send(error: io::Error) -> Self {
        match CodecError::from_io(error) {
            CodecError::Io(io) => Self::SendFailed(io),
            codec => Self::Codec(codec),
        }
    }

    fn closed_for_send() -> Self {
        Self::SendFailed(io::Error::new(
            io::ErrorKind::NotConnected,
            "connection already closed",
        ))
    }
}

/// Shared state for one accepted connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    connected_at: Timestamp,
    message_count: AtomicU64,
    closed: CancellationToken,
    reader: Mutex<FramedRead<OwnedReadHalf, MessageCodec>>,
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, MessageCodec>>>,
}

impl ConnectionHandle {
    /// Wrap an accepted stream, identified by its peer address.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the peer address cannot be read.
    pub fn new(stream: TcpStream, max_frame_length: usize) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self::with_peer(stream, peer, max_frame_length))
    }

    /// Wrap an accepted stream whose peer address is already known.
    #[must_use]
    pub fn with_peer(stream: TcpStream, peer: SocketAddr, max_frame_length: usize) -> Self {
        let (read, write) = stream.into_split();
        Self {
            id: ConnectionId::new(peer),
            connected_at: now(),
            message_count: AtomicU64::new(0),
            closed: CancellationToken::new(),
            reader: Mutex::new(FramedRead::new(read, MessageCodec::new(max_frame_length))),
            writer: Mutex::new(Some(FramedWrite::new(
                write,
                MessageCodec::new(max_frame_length),
            ))),
        }
    }

    /// Peer identifier, `address:port`.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// When the connection was accepted.
    #[must_use]
    pub fn connected_at(&self) -> Timestamp { self.connected_at }

    /// Messages successfully received on this connection.
    #[must_use]
    pub fn message_count(&self) -> u64 { self.message_count.load(Ordering::Relaxed) }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.is_cancelled() }

    /// Encode and write one message, flushing it to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::SendFailed`] if the write fails or the
    /// handle is closed, and [`ConnectionError::Codec`] if the message does
    /// not fit in a frame.
    pub async fn send(&self, message: Message) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::closed_for_send());
        }
        let mut writer = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(ConnectionError::closed_for_send()),
            guard = self.writer.lock() => guard,
        };
        let Some(sink) = writer.as_mut() else {
            return Err(ConnectionError::closed_for_send());
        };
        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(ConnectionError::closed_for_send()),
            sent = sink.send(message) => sent.map_err(ConnectionError::from_send),
        };
        match &result {
            Ok(()) => metrics::inc_frames(Direction::Outbound),
            Err(error) => {
                tracing::debug!(connection = %self.id, %error, "send failed");
            }
        }
        result
    }

    /// Read and decode exactly one message.
    ///
    /// Only one task should receive on a handle; concurrent callers are
    /// serialized.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::ConnectionClosed`] on a clean EOF at a frame
    ///   boundary, or once [`close`](Self::close) has been called.
    /// - [`ConnectionError::Codec`] for truncated, oversized or malformed
    ///   frames.
    /// - [`ConnectionError::ReceiveFailed`] for other transport failures.
    pub async fn receive_one(&self) -> Result<Message, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::ConnectionClosed);
        }
        let mut reader = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(ConnectionError::ConnectionClosed),
            guard = self.reader.lock() => guard,
        };
        let next = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(ConnectionError::ConnectionClosed),
            next = reader.next() => next,
        };
        match next {
            Some(Ok(message)) => {
                self.message_count.fetch_add(1, Ordering::Relaxed);
                metrics::inc_frames(Direction::Inbound);
                Ok(message)
            }
            Some(Err(error)) => Err(ConnectionError::from_receive(error)),
            None => Err(ConnectionError::ConnectionClosed),
        }
    }

    /// Close the connection.
    ///
    /// Unblocks any pending [`receive_one`](Self::receive_one) or
    /// [`send`](Self::send), then flushes and shuts down the write half.
    /// Calling this more than once is harmless.
    pub async fn close(&self) {
        self.closed.cancel();
        let sink = self.writer.lock().await.take();
        let Some(mut sink) = sink else {
            return;
        };
        match tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => tracing::trace!(connection = %self.id, "connection closed"),
            Ok(Err(error)) => {
                tracing::debug!(connection = %self.id, %error, "error while closing connection");
            }
            Err(_) => {
                tracing::debug!(connection = %self.id, "timed out flushing on close");
            }
        }
    }
}
