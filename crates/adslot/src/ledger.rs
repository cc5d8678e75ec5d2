//! Frequency-cap ledger
//!
//! Answers "has this unit already been counted?" and remembers the tracker
//! value the remote content wants replayed on the next load. Every storage
//! failure is logged and degraded: reads become "absent", writes become
//! "not yet durable". Nothing here is surfaced to the host.

use crate::store::KeyValueStore;
use crate::unit::UnitId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const COUNTED: &str = "true";

/// Per-unit frequency-cap flags and tracker values over a shared store
#[derive(Clone)]
pub struct FrequencyCapLedger {
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for FrequencyCapLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyCapLedger").finish_non_exhaustive()
    }
}

impl FrequencyCapLedger {
    /// Create a ledger over `store`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// True only if the flag is present and set
    pub async fn has_been_counted(&self, unit_id: &UnitId) -> bool {
        let key = unit_id.counter_key();
        match self.store.get(&key).await {
            Ok(value) => value.as_deref() == Some(COUNTED),
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "counter lookup failed, treating as not counted");
                false
            }
        }
    }

    /// Record the unit as counted; returns whether the write was durable
    pub async fn mark_counted(&self, unit_id: &UnitId) -> bool {
        let key = unit_id.counter_key();
        match self.store.set(&key, COUNTED).await {
            Ok(()) => {
                debug!(unit_id = %unit_id, "unit marked counted");
                true
            }
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "failed to persist counter flag");
                false
            }
        }
    }

    /// Tracker value saved by a previous load, if any
    pub async fn tracker_value(&self, unit_id: &UnitId) -> Option<String> {
        let key = unit_id.tracker_key();
        match self.store.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "tracker lookup failed");
                None
            }
        }
    }

    /// Remember the tracker value for the next load
    pub async fn save_tracker(&self, unit_id: &UnitId, value: &str) -> bool {
        let key = unit_id.tracker_key();
        match self.store.set(&key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "failed to persist tracker value");
                false
            }
        }
    }

    /// Forget the tracker value once the unit is counted
    pub async fn clear_tracker(&self, unit_id: &UnitId) -> bool {
        let key = unit_id.tracker_key();
        match self.store.delete(&key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "failed to delete tracker value");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{AdSlotError, AdSlotResult};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, key: &str) -> AdSlotResult<Option<String>> {
            Err(AdSlotError::storage(key, "unavailable"))
        }

        async fn set(&self, key: &str, _value: &str) -> AdSlotResult<()> {
            Err(AdSlotError::storage(key, "unavailable"))
        }

        async fn delete(&self, key: &str) -> AdSlotResult<()> {
            Err(AdSlotError::storage(key, "unavailable"))
        }
    }

    fn ledger() -> (FrequencyCapLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (FrequencyCapLedger::new(store.clone()), store)
    }

    mod counter_tests {
        use super::*;

        #[tokio::test]
        async fn test_absent_is_not_counted() {
            let (ledger, _) = ledger();
            assert!(!ledger.has_been_counted(&UnitId::from(1_u32)).await);
        }

        #[tokio::test]
        async fn test_mark_counted_is_sticky_and_idempotent() {
            let (ledger, store) = ledger();
            let unit = UnitId::from(1_u32);
            assert!(ledger.mark_counted(&unit).await);
            assert!(ledger.mark_counted(&unit).await);
            assert!(ledger.has_been_counted(&unit).await);
            assert_eq!(store.get("counter:1").await.unwrap().as_deref(), Some("true"));
        }

        #[tokio::test]
        async fn test_units_are_independent() {
            let (ledger, _) = ledger();
            ledger.mark_counted(&UnitId::from(1_u32)).await;
            assert!(!ledger.has_been_counted(&UnitId::from(2_u32)).await);
        }

        #[tokio::test]
        async fn test_non_true_value_is_not_counted() {
            let (ledger, store) = ledger();
            store.set("counter:3", "false").await.unwrap();
            assert!(!ledger.has_been_counted(&UnitId::from(3_u32)).await);
        }
    }

    mod tracker_tests {
        use super::*;

        #[tokio::test]
        async fn test_tracker_round_trip_and_clear() {
            let (ledger, _) = ledger();
            let unit = UnitId::from(42_u32);
            assert_eq!(ledger.tracker_value(&unit).await, None);
            assert!(ledger.save_tracker(&unit, "abc123").await);
            assert_eq!(ledger.tracker_value(&unit).await.as_deref(), Some("abc123"));
            assert!(ledger.clear_tracker(&unit).await);
            assert_eq!(ledger.tracker_value(&unit).await, None);
        }
    }

    mod failure_tests {
        use super::*;

        #[tokio::test]
        async fn test_storage_failures_degrade_silently() {
            let ledger = FrequencyCapLedger::new(Arc::new(BrokenStore));
            let unit = UnitId::from(5_u32);
            assert!(!ledger.has_been_counted(&unit).await);
            assert!(!ledger.mark_counted(&unit).await);
            assert_eq!(ledger.tracker_value(&unit).await, None);
            assert!(!ledger.save_tracker(&unit, "x").await);
            assert!(!ledger.clear_tracker(&unit).await);
        }
    }
}
