//! Frame-level peer for byte-exact assertions.

use std::{net::SocketAddr, time::Duration};

use bytes::BufMut;
use framelink::{
    CodecError,
    Message,
    Request,
    codec::{DEFAULT_MAX_FRAME_LENGTH, LENGTH_HEADER_SIZE, read_message, write_message},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::TestResult;

/// Longest [`RawPeer::recv`] waits before failing the test.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A plain TCP connection speaking frames directly, with no client engine.
pub struct RawPeer {
    stream: TcpStream,
    max_frame_length: usize,
}

impl RawPeer {
    /// Connect to `addr`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while connecting.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        })
    }

    /// Local address of this peer, which is also its server-side id.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> { self.stream.local_addr() }

    /// Frame and send `message`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding or writing fails.
    pub async fn send(&mut self, message: &Message) -> Result<(), CodecError> {
        write_message(&mut self.stream, message, self.max_frame_length).await
    }

    /// Send `request`, tagging it with `request_id` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub async fn send_request(&mut self, request: &Request, request_id: Option<u64>) -> TestResult {
        let mut message = request.to_message()?;
        message.set_request_id(request_id);
        self.send(&message).await?;
        Ok(())
    }

    /// Write `bytes` to the socket verbatim.
    ///
    /// # Errors
    ///
    /// Returns any write error.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Write a header declaring `declared` bytes followed by `payload`, which
    /// may be shorter or longer than declared.
    ///
    /// # Errors
    ///
    /// Returns any write error.
    pub async fn send_frame(&mut self, declared: u32, payload: &[u8]) -> std::io::Result<()> {
        let mut frame = Vec::with_capacity(LENGTH_HEADER_SIZE + payload.len());
        frame.put_u32(declared);
        frame.put_slice(payload);
        self.send_bytes(&frame).await
    }

    /// Read the next message.
    ///
    /// # Errors
    ///
    /// Returns an error if no frame arrives within five seconds or the frame
    /// cannot be decoded.
    pub async fn recv(&mut self) -> TestResult<Message> {
        let message = tokio::time::timeout(
            RECV_TIMEOUT,
            read_message(&mut self.stream, self.max_frame_length),
        )
        .await
        .map_err(|_| "timed out waiting for a frame")??;
        Ok(message)
    }

    /// Read messages until one of type `kind` arrives, returning it.
    ///
    /// Messages of other types are discarded.
    ///
    /// # Errors
    ///
    /// As for [`recv`](Self::recv).
    pub async fn recv_kind(&mut self, kind: &str) -> TestResult<Message> {
        loop {
            let message = self.recv().await?;
            if message.kind() == kind {
                return Ok(message);
            }
        }
    }

    /// Read one raw frame, returning the declared length and payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends early or times out.
    pub async fn recv_raw(&mut self) -> TestResult<(u32, Vec<u8>)> {
        tokio::time::timeout(RECV_TIMEOUT, async {
            let declared = self.stream.read_u32().await?;
            let mut payload = vec![0_u8; usize::try_from(declared)?];
            self.stream.read_exact(&mut payload).await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>((declared, payload))
        })
        .await
        .map_err(|_| "timed out waiting for a frame")?
    }

    /// Whether the server closes the connection within five seconds.
    ///
    /// Any frames still in flight are read and discarded first.
    pub async fn closed_by_server(&mut self) -> bool {
        let mut buf = [0_u8; 1024];
        let drained = tokio::time::timeout(RECV_TIMEOUT, async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return true,
                    Ok(_) => {}
                }
            }
        })
        .await;
        drained.unwrap_or(false)
    }

    /// Whether nothing arrives for `quiet`.
    pub async fn is_silent_for(&mut self, quiet: Duration) -> bool {
        let mut byte = [0_u8; 1];
        tokio::time::timeout(quiet, self.stream.peek(&mut byte))
            .await
            .is_err()
    }
}
