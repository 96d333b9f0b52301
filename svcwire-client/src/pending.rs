//! In-flight request bookkeeping.

use crate::error::ClientError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use svcwire_protocol::Frame;
use tokio::sync::oneshot;

/// Completion channel for one request.
pub(crate) type ReplySender = oneshot::Sender<Result<Frame, ClientError>>;

/// One in-flight request awaiting its reply.
pub(crate) struct Pending {
    pub deadline: Instant,
    pub tx: ReplySender,
}

/// Table of in-flight requests keyed by message id.
///
/// Removal is the single point of arbitration between reply delivery,
/// timeout sweep and disconnect teardown: whoever removes an entry owns
/// its completion, so each request completes exactly once. The losers of
/// the race find nothing to remove and do nothing.
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u64, Pending>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, msg_id: u64, deadline: Instant, tx: ReplySender) {
        self.entries.lock().insert(msg_id, Pending { deadline, tx });
    }

    pub fn remove(&self, msg_id: u64) -> Option<Pending> {
        self.entries.lock().remove(&msg_id)
    }

    /// Detaches every entry by swapping in a fresh map, so the detached
    /// entries can be failed outside any lock. Requests registered
    /// concurrently land in the fresh map and are unaffected.
    pub fn drain(&self) -> Vec<Pending> {
        let detached = std::mem::take(&mut *self.entries.lock());
        detached.into_values().collect()
    }

    /// Ids of entries whose deadline has passed. Collection holds the
    /// lock only briefly; actual removal happens per entry afterwards.
    pub fn expired(&self, now: Instant) -> Vec<u64> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sender() -> (ReplySender, oneshot::Receiver<Result<Frame, ClientError>>) {
        oneshot::channel()
    }

    #[test]
    fn test_remove_wins_once() {
        let table = PendingTable::new();
        let (tx, _rx) = sender();
        table.insert(1, Instant::now(), tx);

        assert!(table.remove(1).is_some());
        assert!(table.remove(1).is_none());
    }

    #[test]
    fn test_drain_detaches_everything() {
        let table = PendingTable::new();
        for id in 0..5 {
            let (tx, _rx) = sender();
            table.insert(id, Instant::now(), tx);
        }

        let detached = table.drain();
        assert_eq!(detached.len(), 5);
        assert!(table.is_empty());
    }

    #[test]
    fn test_expired_only_past_deadlines() {
        let table = PendingTable::new();
        let now = Instant::now();

        let (tx, _rx1) = sender();
        table.insert(1, now - Duration::from_millis(1), tx);
        let (tx, _rx2) = sender();
        table.insert(2, now + Duration::from_secs(60), tx);

        let expired = table.expired(now);
        assert_eq!(expired, vec![1]);
        assert_eq!(table.len(), 2);
    }
}
