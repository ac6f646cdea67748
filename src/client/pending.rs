//! Pending request table.
//!
//! Maps `request_id` to the one-shot slot of the caller awaiting that reply.
//! Each slot is owned by a [`PendingGuard`] that removes it when dropped, so
//! an entry never outlives its caller whether the request succeeds, times out
//! or is cancelled.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use super::ClientError;
use crate::message::Message;

type Slot = oneshot::Sender<Result<Message, ClientError>>;

/// Concurrent table of requests awaiting a reply.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    slots: DashMap<u64, Slot>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self { Self::default() }

    /// Park a caller waiting for the reply to `id`.
    pub(crate) fn register(
        self: &Arc<Self>,
        id: u64,
    ) -> (PendingGuard, oneshot::Receiver<Result<Message, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(id, tx);
        let guard = PendingGuard {
            table: Arc::clone(self),
            id,
        };
        (guard, rx)
    }

    /// Hand `message` to the caller waiting on `id`.
    ///
    /// Returns the message back if nobody is registered for `id`. A caller
    /// that gave up after lookup simply never sees the reply.
    pub(crate) fn resolve(&self, id: u64, message: Message) -> Result<(), Message> {
        let Some((_, slot)) = self.slots.remove(&id) else {
            return Err(message);
        };
        if slot.send(Ok(message)).is_err() {
            tracing::trace!(request_id = id, "caller dropped before reply arrived");
        }
        Ok(())
    }

    /// Fail every waiting caller with the error built by `error`.
    ///
    /// Returns how many callers were failed.
    pub(crate) fn fail_all(&self, error: impl Fn() -> ClientError) -> usize {
        let ids: Vec<u64> = self.slots.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.slots.remove(&id))
            .map(|(_, slot)| {
                let _ = slot.send(Err(error()));
            })
            .count()
    }

    pub(crate) fn len(&self) -> usize { self.slots.len() }

    fn remove(&self, id: u64) { self.slots.remove(&id); }
}

/// Removes its pending entry when dropped.
#[derive(Debug)]
pub(crate) struct PendingGuard {
    table: Arc<PendingRequests>,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) { self.table.remove(self.id); }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::PendingRequests;
    use crate::{client::ClientError, message::Message};

    #[fixture]
    fn table() -> Arc<PendingRequests> { Arc::new(PendingRequests::new()) }

    #[rstest]
    #[tokio::test]
    async fn resolve_delivers_to_registered_caller(table: Arc<PendingRequests>) {
        let (_guard, rx) = table.register(7);
        assert!(table.resolve(7, Message::new("pong")).is_ok());
        let reply = rx.await.expect("slot resolved").expect("reply");
        assert_eq!(reply.kind(), "pong");
        assert_eq!(table.len(), 0);
    }

    #[rstest]
    fn unknown_id_hands_message_back(table: Arc<PendingRequests>) {
        let returned = table.resolve(3, Message::new("pong")).expect_err("no caller");
        assert_eq!(returned.kind(), "pong");
    }

    #[rstest]
    fn dropped_guard_retires_entry(table: Arc<PendingRequests>) {
        let (guard, _rx) = table.register(1);
        assert_eq!(table.len(), 1);
        drop(guard);
        assert_eq!(table.len(), 0);
        assert!(table.resolve(1, Message::new("pong")).is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn fail_all_reaches_every_caller(table: Arc<PendingRequests>) {
        let waiting: Vec<_> = (1..=3).map(|id| table.register(id)).collect();
        assert_eq!(table.fail_all(|| ClientError::ConnectionLost), 3);
        for (_guard, rx) in waiting {
            let result = rx.await.expect("slot resolved");
            assert!(matches!(result, Err(ClientError::ConnectionLost)));
        }
        assert_eq!(table.len(), 0);
    }
}
