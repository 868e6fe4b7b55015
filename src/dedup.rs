//! Duplicate suppression and per-run notification cap.
//!
//! Each fingerprint moves through
//! `unseen → pending → notified(ts) → cooling down → eligible`:
//!
//! - a fingerprint notified less than `cooldown` ago is a duplicate;
//! - a fingerprint admitted earlier in the same run is `pending` until its
//!   delivery resolves, so a second identical finding in the run is a
//!   duplicate even before the first one is delivered;
//! - every admitted finding reserves one of the run's `max_notifications`
//!   slots; once they are gone further findings are capped. A failed
//!   delivery gives its slot and its pending mark back.
//!
//! Timestamps live in an injected [`DedupStore`] so they survive the run.
//! Pending marks and reserved slots live in a [`NotificationLedger`] owned
//! by one run, so overlapping runs on the same [`Deduplicator`] never share
//! a cap.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicUsize, Ordering}
    }
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tracing::warn;

use crate::error::StoreError;

/// Persistent fingerprint → last-notified mapping.
pub trait DedupStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<DateTime<Utc>>;
    fn put(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Process-local store, used in tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    entries: RwLock<HashMap<String, DateTime<Utc>>>
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DedupStore for MemoryDedupStore {
    fn get(&self, fingerprint: &str) -> Option<DateTime<Utc>> {
        self.entries.read().ok()?.get(fingerprint).copied()
    }

    fn put(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError("memory store lock poisoned".to_string()))?
            .insert(fingerprint.to_string(), notified_at);
        Ok(())
    }
}

/// Decision for one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Deliver it; a cap slot is reserved
    Eligible,
    /// Same fingerprint notified within the cooldown, or pending in this run
    Duplicate {
        last_notified: Option<DateTime<Utc>>
    },
    /// Run notification cap reached
    Capped
}

#[derive(Debug, Default)]
struct RunState {
    pending:  HashSet<String>,
    reserved: usize
}

/// Cap, pending fingerprints and in-flight deliveries of one run.
#[derive(Debug)]
pub struct NotificationLedger {
    max_notifications: usize,
    state:             Mutex<RunState>,
    in_flight:         AtomicUsize,
    settled:           Notify
}

impl NotificationLedger {
    pub fn new(max_notifications: usize) -> Self {
        Self {
            max_notifications,
            state: Mutex::new(RunState::default()),
            in_flight: AtomicUsize::new(0),
            settled: Notify::new()
        }
    }

    pub fn max_notifications(&self) -> usize {
        self.max_notifications
    }

    /// Slots held by admitted findings
    pub fn reserved(&self) -> usize {
        self.state.lock().map(|s| s.reserved).unwrap_or(0)
    }

    /// Give back the slot and pending mark of a failed delivery.
    pub fn release(&self, fingerprint: &str) {
        if let Ok(mut state) = self.state.lock()
            && state.pending.remove(fingerprint)
        {
            state.reserved = state.reserved.saturating_sub(1);
        }
    }

    /// Mark a delivery as started; it counts as in flight until the
    /// returned guard drops.
    pub fn begin_delivery(self: &Arc<Self>) -> DeliveryGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        DeliveryGuard {
            ledger: Arc::clone(self)
        }
    }

    pub fn deliveries_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no delivery of this run is in flight.
    pub async fn settled(&self) {
        loop {
            let notified = self.settled.notified();
            if self.deliveries_in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// In-flight marker returned by [`NotificationLedger::begin_delivery`].
#[derive(Debug)]
pub struct DeliveryGuard {
    ledger: Arc<NotificationLedger>
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if self.ledger.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.ledger.settled.notify_waiters();
        }
    }
}

/// Cooldown gate in front of the notification sink.
pub struct Deduplicator {
    store:    Arc<dyn DedupStore>,
    cooldown: Duration
}

impl Deduplicator {
    pub fn new(store: Arc<dyn DedupStore>, cooldown: Duration) -> Self {
        Self {
            store,
            cooldown
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide whether a finding may be notified at `now`, reserving a slot
    /// of `ledger` when it may.
    pub fn admit(
        &self,
        ledger: &NotificationLedger,
        fingerprint: &str,
        now: DateTime<Utc>
    ) -> Admission {
        let Ok(mut state) = ledger.state.lock() else {
            return Admission::Capped;
        };
        if state.pending.contains(fingerprint) {
            return Admission::Duplicate {
                last_notified: None
            };
        }
        if let Some(last) = self.store.get(fingerprint)
            && now.signed_duration_since(last) < self.cooldown
        {
            return Admission::Duplicate {
                last_notified: Some(last)
            };
        }
        if state.reserved >= ledger.max_notifications {
            return Admission::Capped;
        }
        state.reserved += 1;
        state.pending.insert(fingerprint.to_string());
        Admission::Eligible
    }

    /// Record a successful delivery. The pending mark stays so the
    /// fingerprint remains a duplicate for the rest of the run.
    ///
    /// Store writes may touch the filesystem and run on the blocking pool.
    pub async fn record_delivery(&self, fingerprint: &str, at: DateTime<Utc>) {
        let store = Arc::clone(&self.store);
        let key = fingerprint.to_string();
        match tokio::task::spawn_blocking(move || store.put(&key, at)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%fingerprint, error = %e, "could not persist notification timestamp");
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "notification timestamp task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> Deduplicator {
        Deduplicator::new(Arc::new(MemoryDedupStore::new()), Duration::hours(24))
    }

    #[test]
    fn pending_fingerprint_is_duplicate() {
        let d = dedup();
        let ledger = NotificationLedger::new(10);
        let now = Utc::now();
        assert_eq!(d.admit(&ledger, "fp", now), Admission::Eligible);
        assert!(matches!(d.admit(&ledger, "fp", now), Admission::Duplicate { .. }));
    }

    #[test]
    fn release_frees_slot() {
        let d = dedup();
        let ledger = NotificationLedger::new(1);
        let now = Utc::now();
        assert_eq!(d.admit(&ledger, "a", now), Admission::Eligible);
        assert_eq!(d.admit(&ledger, "b", now), Admission::Capped);
        ledger.release("a");
        assert_eq!(ledger.reserved(), 0);
        assert_eq!(d.admit(&ledger, "b", now), Admission::Eligible);
    }

    #[test]
    fn ledgers_do_not_share_slots() {
        let d = dedup();
        let first = NotificationLedger::new(1);
        let second = NotificationLedger::new(1);
        let now = Utc::now();
        assert_eq!(d.admit(&first, "a", now), Admission::Eligible);
        assert_eq!(d.admit(&second, "b", now), Admission::Eligible);
        assert_eq!(d.admit(&first, "c", now), Admission::Capped);
        assert_eq!(first.reserved(), 1);
        assert_eq!(second.reserved(), 1);
    }

    #[tokio::test]
    async fn settled_waits_for_guards() {
        let ledger = Arc::new(NotificationLedger::new(1));
        let guard = ledger.begin_delivery();
        assert_eq!(ledger.deliveries_in_flight(), 1);

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.settled().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(ledger.deliveries_in_flight(), 0);
    }
}
