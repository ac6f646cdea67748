//! Typed request and reply vocabulary.
//!
//! Requests flow from clients to the server; replies flow back, either as the
//! direct answer to a request or unsolicited (`welcome`, peer `broadcast`).
//! Both enums are internally tagged on `type`, so they convert to and from
//! [`Message`] envelopes without any extra framing.

use serde::{Deserialize, Serialize};

use crate::{
    message::{Message, Timestamp, now, timestamp},
    stats::ServerStats,
};

/// Wire tags understood by the server.
pub mod kind {
    /// Liveness probe.
    pub const PING: &str = "ping";
    /// Ask the server to echo content back.
    pub const ECHO: &str = "echo";
    /// Fan content out to every other connected peer.
    pub const BROADCAST: &str = "broadcast";
    /// Ask for live server statistics.
    pub const GET_STATS: &str = "get_stats";

    /// Reply to `ping`.
    pub const PONG: &str = "pong";
    /// Reply to `echo`.
    pub const ECHO_RESPONSE: &str = "echo_response";
    /// Reply to `broadcast`.
    pub const BROADCAST_SENT: &str = "broadcast_sent";
    /// Reply to `get_stats`.
    pub const SERVER_STATS: &str = "server_stats";
    /// Greeting sent once per accepted connection.
    pub const WELCOME: &str = "welcome";
    /// Recoverable per-message failure.
    pub const ERROR: &str = "error";
}

/// Messages a client may send to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Liveness probe; answered with [`Reply::Pong`].
    Ping {
        #[serde(with = "timestamp")]
        timestamp: Timestamp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_info: Option<String>,
    },
    /// Answered with [`Reply::EchoResponse`].
    Echo {
        content: String,
        #[serde(with = "timestamp")]
        timestamp: Timestamp,
    },
    /// Delivered to every other peer; answered with [`Reply::BroadcastSent`].
    Broadcast {
        content: String,
        #[serde(with = "timestamp")]
        timestamp: Timestamp,
    },
    /// Answered with [`Reply::ServerStats`].
    GetStats {
        #[serde(with = "timestamp")]
        timestamp: Timestamp,
    },
}

impl Request {
    /// Tags of every request variant.
    pub const KINDS: [&'static str; 4] = [kind::PING, kind::ECHO, kind::BROADCAST, kind::GET_STATS];

    /// `ping` stamped with the current time.
    #[must_use]
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: now(),
            client_info: None,
        }
    }

    /// `echo` stamped with the current time.
    #[must_use]
    pub fn echo(content: impl Into<String>) -> Self {
        Self::Echo {
            content: content.into(),
            timestamp: now(),
        }
    }

    /// `broadcast` stamped with the current time.
    #[must_use]
    pub fn broadcast(content: impl Into<String>) -> Self {
        Self::Broadcast {
            content: content.into(),
            timestamp: now(),
        }
    }

    /// `get_stats` stamped with the current time.
    #[must_use]
    pub fn get_stats() -> Self { Self::GetStats { timestamp: now() } }

    /// Wire tag of this request.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping { .. } => kind::PING,
            Self::Echo { .. } => kind::ECHO,
            Self::Broadcast { .. } => kind::BROADCAST,
            Self::GetStats { .. } => kind::GET_STATS,
        }
    }

    /// Whether `tag` names a request variant.
    #[must_use]
    pub fn is_known_kind(tag: &str) -> bool { Self::KINDS.contains(&tag) }

    /// The tag of the reply this request expects.
    #[must_use]
    pub fn reply_kind(&self) -> &'static str {
        match self {
            Self::Ping { .. } => kind::PONG,
            Self::Echo { .. } => kind::ECHO_RESPONSE,
            Self::Broadcast { .. } => kind::BROADCAST_SENT,
            Self::GetStats { .. } => kind::SERVER_STATS,
        }
    }

    /// Convert into a wire envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> { Message::from_payload(self) }
}

/// Greeting sent as soon as a connection is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// The id the server assigned to this connection.
    pub client_id: String,
    /// Greeting text.
    pub message: String,
    #[serde(with = "timestamp")]
    pub timestamp: Timestamp,
}

/// Answer to `ping`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// The `timestamp` of the ping being answered, verbatim.
    pub ping_timestamp: String,
    /// When the server produced the pong.
    #[serde(with = "timestamp")]
    pub pong_timestamp: Timestamp,
    /// The id the server assigned to the pinging connection.
    pub client_id: String,
}

impl Pong {
    /// [`ping_timestamp`](Self::ping_timestamp) parsed; naive times read as UTC.
    #[must_use]
    pub fn ping_time(&self) -> Option<Timestamp> { timestamp::parse(&self.ping_timestamp) }
}

/// Answer to `echo`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: Timestamp,
    /// Marker naming the server that echoed the content.
    pub echoed_by: String,
}

/// Content another peer broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastDelivery {
    /// Id of the connection that sent the broadcast.
    pub from_client: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: Timestamp,
}

/// Answer to `broadcast`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSent {
    /// How many peers the server tried to reach, excluding the sender.
    pub recipients: usize,
    #[serde(with = "timestamp")]
    pub timestamp: Timestamp,
}

/// A request could not be handled; the connection stays open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// `type` of the message that was rejected.
    pub original_type: String,
    /// Human-readable reason.
    pub message: String,
    #[serde(with = "timestamp")]
    pub timestamp: Timestamp,
}

/// Messages the server sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Welcome(Welcome),
    Pong(Pong),
    EchoResponse(EchoResponse),
    #[serde(rename = "broadcast")]
    BroadcastDelivery(BroadcastDelivery),
    BroadcastSent(BroadcastSent),
    ServerStats(ServerStats),
    Error(ErrorReply),
}

impl Reply {
    /// Build an `error` reply stamped with the current time.
    #[must_use]
    pub fn error(original_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorReply {
            original_type: original_type.into(),
            message: message.into(),
            timestamp: now(),
        })
    }

    /// Wire tag of this reply.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome(_) => kind::WELCOME,
            Self::Pong(_) => kind::PONG,
            Self::EchoResponse(_) => kind::ECHO_RESPONSE,
            Self::BroadcastDelivery(_) => kind::BROADCAST,
            Self::BroadcastSent(_) => kind::BROADCAST_SENT,
            Self::ServerStats(_) => kind::SERVER_STATS,
            Self::Error(_) => kind::ERROR,
        }
    }

    /// Convert into a wire envelope, copying the correlation identifier of
    /// the request being answered.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_message(&self, request_id: Option<u64>) -> Result<Message, serde_json::Error> {
        let mut message = Message::from_payload(self)?;
        message.set_request_id(request_id);
        Ok(message)
    }

    /// Interpret a wire envelope as a reply.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the envelope is not a known reply.
    pub fn from_message(message: &Message) -> Result<Self, serde_json::Error> {
        message.to_payload()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(Request::ping())]
    #[case(Request::echo("hi"))]
    #[case(Request::broadcast("all"))]
    #[case(Request::get_stats())]
    fn request_tag_matches_kind(#[case] request: Request) {
        let message = request.to_message().expect("encode request");
        assert_eq!(message.kind(), request.kind());
        assert!(Request::is_known_kind(message.kind()));
        let decoded: Request = message.to_payload().expect("decode request");
        assert_eq!(decoded, request);
    }

    #[test]
    fn broadcast_delivery_uses_broadcast_tag() {
        let reply = Reply::BroadcastDelivery(BroadcastDelivery {
            from_client: "127.0.0.1:5000".into(),
            content: "hello".into(),
            timestamp: now(),
        });
        let message = reply.to_message(None).expect("encode reply");
        assert_eq!(message.kind(), kind::BROADCAST);
        assert_eq!(message.get_str("from_client"), Some("127.0.0.1:5000"));
    }

    #[test]
    fn reply_carries_request_id() {
        let message = Reply::error("bogus", "unknown message type")
            .to_message(Some(42))
            .expect("encode reply");
        assert_eq!(message.request_id(), Some(42));
        assert!(matches!(
            Reply::from_message(&message).expect("decode reply"),
            Reply::Error(ErrorReply { ref original_type, .. }) if original_type == "bogus"
        ));
    }

    #[test]
    fn ping_accepts_naive_timestamps_and_extra_fields() {
        let message: Message = serde_json::from_value(json!({
            "type": "ping",
            "timestamp": "2024-01-02T03:04:05.678901",
            "client_info": "TCP Client localhost:9999",
            "request_id": 3
        }))
        .expect("valid envelope");
        let request: Request = message.to_payload().expect("decode ping");
        assert!(matches!(request, Request::Ping { client_info: Some(_), .. }));
    }

    #[test]
    fn echo_without_content_is_rejected() {
        let message = Message::new(kind::ECHO).with_field("timestamp", "2024-01-02T03:04:05Z");
        assert!(message.to_payload::<Request>().is_err());
    }
}
