use std::sync::Arc;

use analytics_sentinel::{
    dedup::{Admission, DedupStore, Deduplicator, MemoryDedupStore, NotificationLedger},
    state::FileStateStore
};
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

fn at(hour: u32, minute: u32, second: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, second).unwrap()
}

fn memory_dedup(cooldown: Duration) -> Deduplicator {
    Deduplicator::new(Arc::new(MemoryDedupStore::new()), cooldown)
}

#[test]
fn test_unseen_fingerprint_is_eligible() {
    let dedup = memory_dedup(Duration::hours(24));
    let ledger = NotificationLedger::new(20);
    assert_eq!(dedup.admit(&ledger, "fp", at(6, 0, 0)), Admission::Eligible);
}

#[test]
fn test_cooldown_boundary() {
    let store = Arc::new(MemoryDedupStore::new());
    store.put("fp", at(6, 0, 0)).unwrap();
    let dedup = Deduplicator::new(store, Duration::hours(1));
    let ledger = NotificationLedger::new(20);

    assert_eq!(
        dedup.admit(&ledger, "fp", at(6, 59, 59)),
        Admission::Duplicate {
            last_notified: Some(at(6, 0, 0))
        }
    );
    assert_eq!(dedup.admit(&ledger, "fp", at(7, 0, 0)), Admission::Eligible);
}

#[test]
fn test_cap_is_exact() {
    let dedup = memory_dedup(Duration::hours(24));
    let ledger = NotificationLedger::new(3);
    let now = at(6, 0, 0);

    let admitted = (0..10)
        .filter(|i| dedup.admit(&ledger, &format!("fp-{}", i), now) == Admission::Eligible)
        .count();

    assert_eq!(admitted, 3);
    assert_eq!(dedup.admit(&ledger, "fp-99", now), Admission::Capped);
}

#[test]
fn test_duplicate_does_not_consume_cap() {
    let store = Arc::new(MemoryDedupStore::new());
    store.put("old", at(5, 0, 0)).unwrap();
    let dedup = Deduplicator::new(store, Duration::hours(24));
    let ledger = NotificationLedger::new(1);
    let now = at(6, 0, 0);

    assert!(matches!(dedup.admit(&ledger, "old", now), Admission::Duplicate { .. }));
    assert_eq!(dedup.admit(&ledger, "new", now), Admission::Eligible);
}

#[tokio::test]
async fn test_recorded_delivery_is_duplicate_in_next_run() {
    let store = Arc::new(MemoryDedupStore::new());
    let dedup = Deduplicator::new(store.clone(), Duration::hours(24));
    let now = at(6, 0, 0);

    let first = NotificationLedger::new(5);
    assert_eq!(dedup.admit(&first, "fp", now), Admission::Eligible);
    dedup.record_delivery("fp", now).await;

    let second = NotificationLedger::new(5);
    assert_eq!(store.len(), 1);
    assert_eq!(
        dedup.admit(&second, "fp", now + Duration::hours(2)),
        Admission::Duplicate {
            last_notified: Some(now)
        }
    );
}

#[test]
fn test_released_fingerprint_can_be_retried() {
    let dedup = memory_dedup(Duration::hours(24));
    let ledger = NotificationLedger::new(1);
    let now = at(6, 0, 0);

    assert_eq!(dedup.admit(&ledger, "fp", now), Admission::Eligible);
    ledger.release("fp");
    assert_eq!(dedup.admit(&ledger, "fp", now), Admission::Eligible);
}

#[test]
fn test_release_of_unknown_fingerprint_keeps_cap() {
    let dedup = memory_dedup(Duration::hours(24));
    let ledger = NotificationLedger::new(1);
    let now = at(6, 0, 0);

    assert_eq!(dedup.admit(&ledger, "a", now), Admission::Eligible);
    ledger.release("never-admitted");
    assert_eq!(dedup.admit(&ledger, "b", now), Admission::Capped);
}

#[test]
fn test_overlapping_ledgers_keep_separate_caps() {
    let dedup = memory_dedup(Duration::hours(24));
    let now = at(6, 0, 0);
    let morning = NotificationLedger::new(1);
    let evening = NotificationLedger::new(1);

    assert_eq!(dedup.admit(&morning, "a", now), Admission::Eligible);
    assert_eq!(dedup.admit(&evening, "b", now), Admission::Eligible);
    assert_eq!(dedup.admit(&morning, "c", now), Admission::Capped);
    assert_eq!(dedup.admit(&evening, "d", now), Admission::Capped);

    morning.release("a");
    assert_eq!(evening.reserved(), 1);
    assert_eq!(dedup.admit(&evening, "e", now), Admission::Capped);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let now = at(6, 0, 0);

    {
        let store = Arc::new(FileStateStore::open(&path).unwrap());
        let dedup = Deduplicator::new(store, Duration::hours(24));
        let ledger = NotificationLedger::new(5);
        assert_eq!(dedup.admit(&ledger, "fp", now), Admission::Eligible);
        dedup.record_delivery("fp", now).await;
    }

    let store = Arc::new(FileStateStore::open(&path).unwrap());
    let dedup = Deduplicator::new(store, Duration::hours(24));
    let ledger = NotificationLedger::new(5);
    assert!(matches!(
        dedup.admit(&ledger, "fp", now + Duration::hours(3)),
        Admission::Duplicate { .. }
    ));
    assert_eq!(
        dedup.admit(&ledger, "fp", now + Duration::hours(24)),
        Admission::Eligible
    );
}
