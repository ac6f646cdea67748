//! Error types for the frame codec.
//!
//! Every variant except [`CodecError::Io`] is a protocol-framing fault: it is
//! fatal to the one connection that produced it and never to the process.
//!
//! The codec runs inside `tokio_util`'s `FramedRead`/`FramedWrite`, which
//! require `io::Error` as the codec error type. [`CodecError`] therefore
//! converts into an `io::Error` (kind `InvalidData` for framing faults,
//! `UnexpectedEof` for truncation) and can be recovered from one with
//! [`CodecError::from_io`].

use std::io;

use thiserror::Error;

/// Faults raised while framing, encoding or decoding a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The source closed before a full header or payload arrived.
    #[error("incomplete frame: received {bytes_received} of {expected} bytes")]
    IncompleteFrame {
        /// Bytes of the current section (header or payload) that arrived.
        bytes_received: usize,
        /// Bytes the section required.
        expected: usize,
    },

    /// The payload was not a JSON object carrying a string `type`.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// The declared (or encoded) payload length exceeds the configured limit.
    #[error("frame exceeds max length: {size} > {max}")]
    FrameTooLarge {
        /// Length declared by the prefix or produced by the encoder.
        size: usize,
        /// Maximum payload length accepted.
        max: usize,
    },

    /// Transport failure underneath the codec.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Recover a structured codec error from an `io::Error` produced by the
    /// codec, or wrap a plain transport error as [`CodecError::Io`].
    #[must_use]
    pub fn from_io(error: io::Error) -> Self {
        let is_codec = error
            .get_ref()
            .is_some_and(|inner| inner.is::<CodecError>());
        if !is_codec {
            return Self::Io(error);
        }
        match error.into_inner().map(|inner| inner.downcast::<CodecError>()) {
            Some(Ok(codec)) => *codec,
            Some(Err(other)) => Self::Io(io::Error::other(other)),
            None => Self::Io(io::Error::other("codec error without payload")),
        }
    }

    /// Returns `true` for faults in the framing or payload itself, as opposed
    /// to the transport underneath.
    #[must_use]
    pub fn is_protocol_fault(&self) -> bool { !matches!(self, Self::Io(_)) }
}

impl From<CodecError> for io::Error {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Io(inner) => inner,
            incomplete @ CodecError::IncompleteFrame { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, incomplete)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
