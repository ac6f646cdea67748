//! Background task reading replies for a [`Client`](super::Client).

use std::sync::Arc;

use futures::StreamExt;
use tokio::{net::tcp::OwnedReadHalf, sync::mpsc};
use tokio_util::{codec::FramedRead, sync::CancellationToken};
use tracing::Instrument;

use super::{ClientError, pending::PendingRequests};
use crate::{
    codec::{CodecError, MessageCodec},
    message::Message,
};

pub(crate) struct ReceiveLoop {
    pub reader: FramedRead<OwnedReadHalf, MessageCodec>,
    pub pending: Arc<PendingRequests>,
    pub incoming: mpsc::Sender<Message>,
    pub connection: CancellationToken,
}

impl ReceiveLoop {
    pub(crate) fn spawn(self, peer: std::net::SocketAddr) -> tokio::task::JoinHandle<()> {
        let span = tracing::debug_span!("client_receive", %peer);
        tokio::spawn(self.run().instrument(span))
    }

    /// Route frames until the connection ends, then fail anything still
    /// waiting for a reply.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;

                () = self.connection.cancelled() => break,
                next = self.reader.next() => next,
            };
            match next {
                Some(Ok(message)) => self.route(message),
                Some(Err(error)) => {
                    let error = CodecError::from_io(error);
                    tracing::warn!(%error, "receive failed, dropping connection");
                    break;
                }
                None => {
                    tracing::debug!("server closed connection");
                    break;
                }
            }
        }
        self.connection.cancel();
        let failed = self.pending.fail_all(|| ClientError::ConnectionLost);
        if failed > 0 {
            tracing::debug!(failed, "failed pending requests");
        }
    }

    fn route(&self, message: Message) {
        let message = match message.request_id() {
            Some(id) => match self.pending.resolve(id, message) {
                Ok(()) => return,
                Err(unclaimed) => {
                    tracing::debug!(request_id = id, "reply has no waiting request");
                    unclaimed
                }
            },
            None => message,
        };
        match self.incoming.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(kind = message.kind(), "incoming queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                tracing::trace!(kind = message.kind(), "incoming receiver dropped");
            }
        }
    }
}
