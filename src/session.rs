//! Registry of live connection handles.
//!
//! `SessionRegistry` is the one table shared by every connection task. It
//! maps [`ConnectionId`]s to strong [`ConnectionHandle`] references so that
//! any task can look up or fan out to a peer. Each operation takes the lock
//! for a short, non-async critical section; callers that need to do I/O take
//! a [`snapshot`](SessionRegistry::snapshot) and work on that instead.

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::connection::ConnectionHandle;

/// Identifier assigned to a connection: the peer's `address:port`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(SocketAddr);

impl From<SocketAddr> for ConnectionId {
    fn from(value: SocketAddr) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] for the given peer address.
    #[must_use]
    pub fn new(peer: SocketAddr) -> Self { Self(peer) }

    /// The peer address this identifier was derived from.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Concurrent registry of connection handles keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SessionRegistry {
    handles: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    // A panicking holder cannot leave the map half-updated: every critical
    // section is a single `HashMap` call.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<ConnectionHandle>>> {
        self.handles.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<ConnectionHandle>>> {
        self.handles.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a handle for a newly accepted connection.
    ///
    /// Returns `false`, leaving the existing entry untouched, if a handle
    /// with the same id is already registered.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> bool {
        let mut handles = self.write();
        match handles.entry(handle.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Remove a handle, typically on connection teardown.
    ///
    /// Removing an id that is not present is a no-op returning `None`.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.write().remove(id)
    }

    /// Look up the handle for `id`.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.read().get(id).cloned()
    }

    /// Point-in-time copy of every registered handle, sorted by id.
    ///
    /// Later registrations and removals do not affect the returned vector.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut handles: Vec<_> = self.read().values().cloned().collect();
        handles.sort_by_key(|handle| handle.id());
        handles
    }

    /// Identifiers of every registered connection, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.read().len() }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.read().is_empty() }
}
