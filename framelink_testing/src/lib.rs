//! Utilities for exercising a [`FrameServer`](framelink::FrameServer) in
//! tests.
//!
//! [`TestServer`] runs a real server on an ephemeral localhost port and
//! shuts it down on request. [`RawPeer`] talks to it at the frame level,
//! which lets tests send malformed or oversized frames and assert on the
//! exact bytes coming back.
//!
//! ```rust,no_run
//! use framelink_testing::{RawPeer, TestResult, TestServer};
//!
//! # async fn example() -> TestResult {
//! let server = TestServer::start().await?;
//! let mut peer = RawPeer::connect(server.addr()).await?;
//! let welcome = peer.recv().await?;
//! assert_eq!(welcome.kind(), "welcome");
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod integration_helpers;
pub mod logging;
pub mod peer;
pub mod server;

pub use integration_helpers::{TestResult, unused_listener};
pub use logging::{LoggerHandle, logger};
pub use peer::RawPeer;
pub use server::TestServer;
