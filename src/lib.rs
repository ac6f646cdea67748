#![doc(html_root_url = "https://docs.rs/framelink/latest")]
//! Public API for the `framelink` library.
//!
//! `framelink` speaks a length-prefixed JSON protocol over TCP. The crate
//! provides the frame codec, a multi-client [`FrameServer`] with a session
//! registry and broadcast, and a [`Client`] that correlates concurrent
//! requests with their replies.

pub mod byte_order;
pub mod client;
pub mod codec;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;

pub use client::{Client, ClientBuilder, ClientError};
pub use codec::{CodecError, MessageCodec};
pub use connection::{ConnectionError, ConnectionHandle};
pub use message::{Message, Timestamp};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use protocol::{Reply, Request};
pub use server::{FrameServer, ServerError};
pub use session::{ConnectionId, SessionRegistry};
pub use stats::{ServerStatistics, ServerStats};
