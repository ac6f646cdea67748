//! Typed request helpers for [`Client`].
//!
//! Each helper sends one request with the client's default timeout and
//! checks that the reply has the expected `type`. An `error` reply becomes
//! [`ClientError::Server`].

use serde_json::{Map, Value};

use super::{Client, ClientError};
use crate::{
    codec::CodecError,
    message::Message,
    protocol::{BroadcastSent, EchoResponse, ErrorReply, Pong, Request, kind},
    stats::ServerStats,
};

impl Client {
    /// Send `ping` and wait for the `pong`.
    ///
    /// # Errors
    ///
    /// See [`Client::request`]; additionally [`ClientError::Server`] or
    /// [`ClientError::UnexpectedReply`] for a reply other than `pong`.
    pub async fn ping(&self) -> Result<Pong, ClientError> { self.call(Request::ping()).await }

    /// Ask the server to echo `content` back.
    ///
    /// # Errors
    ///
    /// As for [`ping`](Self::ping).
    pub async fn echo(&self, content: impl Into<String>) -> Result<EchoResponse, ClientError> {
        self.call(Request::echo(content)).await
    }

    /// Broadcast `content` to every other connected client.
    ///
    /// # Errors
    ///
    /// As for [`ping`](Self::ping).
    pub async fn broadcast(
        &self,
        content: impl Into<String>,
    ) -> Result<BroadcastSent, ClientError> {
        self.call(Request::broadcast(content)).await
    }

    /// Fetch the server's statistics.
    ///
    /// # Errors
    ///
    /// As for [`ping`](Self::ping).
    pub async fn server_stats(&self) -> Result<ServerStats, ClientError> {
        self.call(Request::get_stats()).await
    }

    /// Send a message of arbitrary `kind` and return whatever comes back,
    /// including `error` replies.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn send_custom(
        &self,
        kind: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Result<Message, ClientError> {
        let mut message = Message::new(kind);
        for (key, value) in fields {
            message.insert(key, value);
        }
        self.request(message, self.request_timeout()).await
    }

    async fn call<T>(&self, request: Request) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let expected = request.reply_kind();
        let message = request
            .to_message()
            .map_err(|e| ClientError::Codec(CodecError::MalformedPayload(e)))?;
        let reply = self.request(message, self.request_timeout()).await?;
        decode_reply(&reply, expected)
    }
}

/// Interpret `reply` as the payload of an `expected` reply.
pub(crate) fn decode_reply<T>(reply: &Message, expected: &str) -> Result<T, ClientError>
where
    T: serde::de::DeserializeOwned,
{
    match reply.kind() {
        k if k == expected => reply
            .to_payload()
            .map_err(|e| ClientError::Codec(CodecError::MalformedPayload(e))),
        kind::ERROR => {
            let error: ErrorReply = reply
                .to_payload()
                .map_err(|e| ClientError::Codec(CodecError::MalformedPayload(e)))?;
            Err(ClientError::Server {
                original_type: error.original_type,
                message: error.message,
            })
        }
        other => Err(ClientError::UnexpectedReply {
            expected: expected.to_owned(),
            received: other.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{message::now, protocol::Reply};

    fn reply(reply: &Reply) -> Message { reply.to_message(Some(7)).expect("encode reply") }

    #[test]
    fn matching_reply_decodes() {
        let pong = Pong {
            ping_timestamp: "2024-05-01T10:20:30.123456Z".into(),
            pong_timestamp: now(),
            client_id: "127.0.0.1:4000".into(),
        };
        let decoded: Pong =
            decode_reply(&reply(&Reply::Pong(pong.clone())), kind::PONG).expect("pong");
        assert_eq!(decoded, pong);
    }

    #[test]
    fn error_reply_becomes_server_error() {
        let err = decode_reply::<Pong>(&reply(&Reply::error("ping", "nope")), kind::PONG)
            .expect_err("error reply");
        assert!(matches!(
            err,
            ClientError::Server { ref original_type, ref message }
                if original_type == "ping" && message == "nope"
        ));
        assert!(err.is_recoverable());
    }

    #[rstest]
    #[case(Request::echo("x").reply_kind())]
    #[case(kind::SERVER_STATS)]
    fn other_kinds_are_unexpected(#[case] expected: &str) {
        let welcome = Message::new(kind::WELCOME);
        let err = decode_reply::<EchoResponse>(&welcome, expected).expect_err("mismatch");
        assert!(matches!(
            err,
            ClientError::UnexpectedReply { ref received, .. } if received == kind::WELCOME
        ));
    }

    #[test]
    fn malformed_matching_reply_is_codec_error() {
        let bare = Message::new(kind::PONG);
        let err = decode_reply::<Pong>(&bare, kind::PONG).expect_err("missing fields");
        assert!(matches!(err, ClientError::Codec(_)));
    }
}
