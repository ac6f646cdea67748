//! Routing of decoded messages to their replies.
//!
//! Every inbound message produces exactly one direct reply to its sender,
//! stamped with the request's `request_id` when present. Unknown types and
//! known types with bad fields are answered with an `error` reply and the
//! connection stays open.

use std::time::Duration;

use futures::future::join_all;
use log::{error, warn};

use super::connection::ServerContext;
use crate::{
    codec::CodecError,
    connection::{ConnectionError, ConnectionHandle},
    message::{Message, now, timestamp as wire_time},
    protocol::{BroadcastDelivery, BroadcastSent, EchoResponse, Pong, Reply, Request},
    session::{ConnectionId, SessionRegistry},
};

/// Longest a single broadcast recipient may take to accept its copy.
const BROADCAST_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle one decoded message from `handle`'s peer.
///
/// # Errors
///
/// Returns the [`ConnectionError`] raised while replying; the caller treats
/// it as fatal to this connection.
pub(super) async fn dispatch(
    handle: &ConnectionHandle,
    message: Message,
    context: &ServerContext,
) -> Result<(), ConnectionError> {
    let request_id = message.request_id();
    let reply = match message.to_payload::<Request>() {
        Ok(request) => respond(handle, &message, request, context).await,
        Err(err) => reject(handle.id(), &message, &err),
    };
    match send_reply(handle, &reply, request_id).await {
        Err(ConnectionError::Codec(CodecError::FrameTooLarge { size, max })) => {
            warn!(
                "reply too large, sending error instead: peer_addr={}, type={}, size={size}, \
                 max={max}",
                handle.id(),
                reply.kind()
            );
            let fallback = Reply::error(
                message.kind(),
                format!("reply of {size} bytes exceeds maximum frame length {max}"),
            );
            send_reply(handle, &fallback, request_id).await
        }
        other => other,
    }
}

async fn respond(
    handle: &ConnectionHandle,
    message: &Message,
    request: Request,
    context: &ServerContext,
) -> Reply {
    match request {
        // Echo the ping's timestamp as sent; parsing only validated it.
        Request::Ping { timestamp, .. } => Reply::Pong(Pong {
            ping_timestamp: message
                .get_str("timestamp")
                .map_or_else(|| wire_time::format(&timestamp), str::to_owned),
            pong_timestamp: now(),
            client_id: handle.id().to_string(),
        }),
        Request::Echo { content, .. } => Reply::EchoResponse(EchoResponse {
            content,
            timestamp: now(),
            echoed_by: context.settings.echo_marker.to_string(),
        }),
        Request::Broadcast { content, .. } => {
            let recipients = broadcast(handle.id(), content, &context.registry).await;
            Reply::BroadcastSent(BroadcastSent {
                recipients,
                timestamp: now(),
            })
        }
        Request::GetStats { .. } => {
            Reply::ServerStats(context.stats.report(context.registry.len()))
        }
    }
}

fn reject(id: ConnectionId, message: &Message, err: &serde_json::Error) -> Reply {
    let kind = message.kind();
    if Request::is_known_kind(kind) {
        warn!("invalid request: peer_addr={id}, type={kind}, error={err}");
        Reply::error(kind, format!("invalid {kind} message: {err}"))
    } else {
        warn!("unknown message type: peer_addr={id}, type={kind}");
        Reply::error(kind, format!("unknown message type: {kind}"))
    }
}

/// Deliver `content` from `sender` to every other registered connection.
///
/// Sends run concurrently on a snapshot of the registry, so no lock is held
/// while writing. A recipient whose send fails or stalls is closed; its own
/// handler task then retires it. Returns the number of recipients attempted.
pub(super) async fn broadcast(
    sender: ConnectionId,
    content: String,
    registry: &SessionRegistry,
) -> usize {
    let peers: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|peer| peer.id() != sender)
        .collect();
    let delivery = Reply::BroadcastDelivery(BroadcastDelivery {
        from_client: sender.to_string(),
        content,
        timestamp: now(),
    });
    let message = match delivery.to_message(None) {
        Ok(message) => message,
        Err(e) => {
            error!("failed to build broadcast message: peer_addr={sender}, error={e}");
            return 0;
        }
    };

    let sends = peers.iter().map(|peer| {
        let message = message.clone();
        async move {
            let result = tokio::time::timeout(BROADCAST_SEND_TIMEOUT, peer.send(message))
                .await
                .unwrap_or_else(|_| {
                    Err(ConnectionError::SendFailed(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "broadcast send timed out",
                    )))
                });
            (peer, result)
        }
    });
    for (peer, result) in join_all(sends).await {
        match result {
            Ok(()) => {}
            // The delivery itself does not fit in a frame; the recipient is fine.
            Err(ConnectionError::Codec(e)) => {
                warn!("broadcast not delivered: from={sender}, to={}, error={e}", peer.id());
            }
            Err(e) => {
                warn!(
                    "broadcast delivery failed, closing recipient: from={sender}, to={}, error={e}",
                    peer.id()
                );
                peer.close().await;
            }
        }
    }
    peers.len()
}

/// Encode `reply`, copy `request_id` onto it and send it to `handle`.
///
/// # Errors
///
/// Returns [`ConnectionError::Codec`] if the reply cannot be encoded, or the
/// error raised by [`ConnectionHandle::send`].
pub(super) async fn send_reply(
    handle: &ConnectionHandle,
    reply: &Reply,
    request_id: Option<u64>,
) -> Result<(), ConnectionError> {
    let message = reply
        .to_message(request_id)
        .map_err(|e| ConnectionError::Codec(CodecError::MalformedPayload(e)))?;
    handle.send(message).await
}
