//! Length-prefixed framing for [`Message`] payloads.
//!
//! Every frame is a 4-byte big-endian payload length followed by exactly that
//! many bytes of UTF-8 JSON:
//!
//! ```text
//! +---------- 4 bytes ----------+--------- N bytes ---------+
//! | payload length N (u32, BE)  | JSON object with "type"   |
//! +-----------------------------+---------------------------+
//! ```
//!
//! [`MessageCodec`] implements `tokio_util`'s [`Decoder`] and [`Encoder`] so
//! it can drive `FramedRead`/`FramedWrite` halves of a socket. The decoder
//! buffers until the whole frame is present; a single socket read is never
//! assumed to carry a full frame. [`read_message`] and [`write_message`]
//! frame a single message directly over any async byte stream without
//! buffering beyond the frame being read.
//!
//! # Error Handling
//!
//! Framing faults are reported as [`CodecError`]: truncation at EOF is
//! [`CodecError::IncompleteFrame`], undecodable JSON is
//! [`CodecError::MalformedPayload`], and a length prefix above the configured
//! limit is rejected with [`CodecError::FrameTooLarge`] before any payload is
//! buffered.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    byte_order::{read_network_u32, write_network_u32},
    message::Message,
};

pub mod error;

pub use error::CodecError;

/// Length prefix size in bytes.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Smallest maximum frame length a codec may be configured with.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Largest maximum frame length a codec may be configured with (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Maximum payload length used when none is configured (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecodeState {
    Head,
    Data(usize),
}

/// Tokio codec turning length-prefixed JSON frames into [`Message`]s.
#[derive(Clone, Debug)]
pub struct MessageCodec {
    max_frame_length: usize,
    state: DecodeState,
}

impl Default for MessageCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

impl MessageCodec {
    /// Construct a codec accepting payloads up to `max_frame_length` bytes.
    ///
    /// The limit is clamped to [`MIN_FRAME_LENGTH`]..=[`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
            state: DecodeState::Head,
        }
    }

    /// Maximum payload length this codec accepts.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<usize>, CodecError> {
        let Some(header) = src
            .get(..LENGTH_HEADER_SIZE)
            .and_then(|slice| <[u8; LENGTH_HEADER_SIZE]>::try_from(slice).ok())
        else {
            return Ok(None);
        };
        let size = read_network_u32(header) as usize;
        if size > self.max_frame_length {
            return Err(CodecError::FrameTooLarge {
                size,
                max: self.max_frame_length,
            });
        }
        src.advance(LENGTH_HEADER_SIZE);
        src.reserve(size);
        Ok(Some(size))
    }

    fn decode_frame(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        let size = match self.state {
            DecodeState::Head => match self.decode_head(src)? {
                Some(size) => {
                    self.state = DecodeState::Data(size);
                    size
                }
                None => return Ok(None),
            },
            DecodeState::Data(size) => size,
        };
        if src.len() < size {
            return Ok(None);
        }
        let payload = src.split_to(size);
        self.state = DecodeState::Head;
        src.reserve(LENGTH_HEADER_SIZE);
        Message::from_slice(&payload)
            .map(Some)
            .map_err(CodecError::MalformedPayload)
    }

    /// Describe how far a truncated frame got.
    fn incomplete(&self, src: &BytesMut) -> CodecError {
        match self.state {
            DecodeState::Head => CodecError::IncompleteFrame {
                bytes_received: src.len(),
                expected: LENGTH_HEADER_SIZE,
            },
            DecodeState::Data(expected) => CodecError::IncompleteFrame {
                bytes_received: src.len(),
                expected,
            },
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_frame(src).map_err(io::Error::from)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        // Clean close: nothing buffered at a frame boundary.
        if src.is_empty() && self.state == DecodeState::Head {
            return Ok(None);
        }
        let err = self.incomplete(src);
        tracing::debug!(error = %err, "connection closed mid-frame");
        Err(err.into())
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, self.max_frame_length, dst).map_err(io::Error::from)
    }
}

fn encode_into(message: &Message, max: usize, dst: &mut BytesMut) -> Result<(), CodecError> {
    let payload = message.to_vec().map_err(CodecError::MalformedPayload)?;
    let too_large = || CodecError::FrameTooLarge {
        size: payload.len(),
        max,
    };
    if payload.len() > max {
        return Err(too_large());
    }
    let length = u32::try_from(payload.len()).map_err(|_| too_large())?;
    dst.reserve(LENGTH_HEADER_SIZE + payload.len());
    dst.put_slice(&write_network_u32(length));
    dst.put_slice(&payload);
    Ok(())
}

/// Encode one message into a standalone frame.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooLarge`] if the payload exceeds
/// `max_frame_length`, or [`CodecError::MalformedPayload`] if serialization
/// fails.
pub fn encode(message: &Message, max_frame_length: usize) -> Result<Bytes, CodecError> {
    let mut dst = BytesMut::new();
    encode_into(message, max_frame_length, &mut dst)?;
    Ok(dst.freeze())
}

/// Read exactly one frame from `reader`.
///
/// Reads the 4-byte header, then exactly the declared number of payload
/// bytes; nothing past the frame is consumed.
///
/// # Errors
///
/// - [`CodecError::IncompleteFrame`] if the stream ends inside the header or
///   payload (including an immediate EOF, which reports zero bytes received).
/// - [`CodecError::FrameTooLarge`] if the declared length exceeds
///   `max_frame_length`; no payload bytes are read in that case.
/// - [`CodecError::MalformedPayload`] if the payload is not a valid message.
/// - [`CodecError::Io`] for other transport failures.
pub async fn read_message<R>(reader: &mut R, max_frame_length: usize) -> Result<Message, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0_u8; LENGTH_HEADER_SIZE];
    read_section(reader, &mut header).await?;
    let size = read_network_u32(header) as usize;
    if size > max_frame_length {
        return Err(CodecError::FrameTooLarge {
            size,
            max: max_frame_length,
        });
    }
    let mut payload = vec![0_u8; size];
    read_section(reader, &mut payload).await?;
    Message::from_slice(&payload).map_err(CodecError::MalformedPayload)
}

/// Fill `buf` completely, reporting how much arrived if the stream ends.
async fn read_section<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let Some(rest) = buf.get_mut(filled..) else {
            break;
        };
        match reader.read(rest).await {
            Ok(0) => {
                return Err(CodecError::IncompleteFrame {
                    bytes_received: filled,
                    expected: buf.len(),
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Ok(())
}

/// Write one framed message to `writer` and flush it.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooLarge`] for oversized payloads and
/// [`CodecError::Io`] if the write fails.
pub async fn write_message<W>(
    writer: &mut W,
    message: &Message,
    max_frame_length: usize,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message, max_frame_length)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests;
