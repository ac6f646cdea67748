//! Aggregate server statistics.
//!
//! [`ServerStatistics`] holds the live counters; [`ServerStats`] is the
//! point-in-time report sent in `server_stats` replies. Reports are always
//! computed at request time, never cached.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::message::{Timestamp, now, timestamp};

/// Live counters shared by every connection task.
#[derive(Debug)]
pub struct ServerStatistics {
    started_at: Timestamp,
    started: Instant,
    total_messages: AtomicU64,
}

impl Default for ServerStatistics {
    fn default() -> Self { Self::new() }
}

impl ServerStatistics {
    /// Start counting from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: now(),
            started: Instant::now(),
            total_messages: AtomicU64::new(0),
        }
    }

    /// Record one successfully decoded inbound message.
    ///
    /// Returns the new total.
    pub fn record_message(&self) -> u64 { self.total_messages.fetch_add(1, Ordering::Relaxed) + 1 }

    /// Messages decoded since start. Never decreases.
    #[must_use]
    pub fn total_messages(&self) -> u64 { self.total_messages.load(Ordering::Relaxed) }

    /// Wall-clock time the server started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp { self.started_at }

    /// Whole seconds since start.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 { self.started.elapsed().as_secs() }

    /// Build a report for `connected_clients` live connections.
    #[must_use]
    pub fn report(&self, connected_clients: usize) -> ServerStats {
        ServerStats {
            connected_clients,
            uptime_seconds: self.uptime_seconds(),
            total_messages: self.total_messages(),
            server_start_time: self.started_at,
            current_time: now(),
        }
    }
}

/// Snapshot of server statistics as sent on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    /// Size of the session registry when the report was built.
    pub connected_clients: usize,
    /// Whole seconds since the server started.
    pub uptime_seconds: u64,
    /// Inbound messages decoded since the server started.
    pub total_messages: u64,
    /// When the server started.
    #[serde(with = "timestamp")]
    pub server_start_time: Timestamp,
    /// When the report was built.
    #[serde(with = "timestamp")]
    pub current_time: Timestamp,
}
