//! In-process [`LocationStore`].
//!
//! Shares the [`ConnectionCache`] machinery with [`crate::PgStore`], so probe
//! failures, reconnects, and outages can be scripted through
//! [`MemoryConnector`] without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkalot_core::LocationRecord;
use tokio::sync::RwLock;

use crate::cache::{ConnectionCache, Connector};
use crate::store::LocationStore;
use crate::DbError;

type Lots = Arc<RwLock<BTreeMap<String, LocationRecord>>>;

#[derive(Default)]
pub struct MemoryConnector {
    lots: Lots,
    connects: AtomicUsize,
    failing_probes: AtomicUsize,
    failing_connects: AtomicUsize,
    failing_operations: AtomicUsize,
}

impl MemoryConnector {
    /// Make the next `n` liveness probes fail.
    pub fn fail_next_probes(&self, n: usize) {
        self.failing_probes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` store operations fail as if the connection dropped.
    pub fn fail_next_operations(&self, n: usize) {
        self.failing_operations.store(n, Ordering::SeqCst);
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn check_operation(&self) -> Result<(), DbError> {
        if take(&self.failing_operations) {
            return Err(DbError::Unavailable("connection reset".into()));
        }
        Ok(())
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Connector for MemoryConnector {
    type Handle = Lots;

    async fn connect(&self) -> Result<Lots, DbError> {
        if take(&self.failing_connects) {
            return Err(DbError::Unavailable("connection refused".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.lots))
    }

    async fn probe(&self, _handle: &Lots) -> Result<(), DbError> {
        if take(&self.failing_probes) {
            return Err(DbError::Unavailable("ping failed".into()));
        }
        Ok(())
    }
}

pub struct MemoryStore {
    cache: ConnectionCache<MemoryConnector>,
}

impl MemoryStore {
    /// Create a store seeded with `lots`. Probes run on every call.
    pub fn new(lots: impl IntoIterator<Item = LocationRecord>) -> Self {
        let connector = MemoryConnector {
            lots: Arc::new(RwLock::new(
                lots.into_iter().map(|lot| (lot.id.clone(), lot)).collect(),
            )),
            ..MemoryConnector::default()
        };
        Self {
            cache: ConnectionCache::new(connector, Duration::ZERO),
        }
    }

    pub fn connector(&self) -> &MemoryConnector {
        self.cache.connector()
    }

    /// Read one lot directly, bypassing the connection cache.
    pub async fn get(&self, id: &str) -> Option<LocationRecord> {
        self.connector().lots.read().await.get(id).cloned()
    }
}

/// Strictly later than `previous`, preferring `at`.
fn advance(previous: Option<DateTime<Utc>>, at: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev >= at => prev + chrono::Duration::microseconds(1),
        _ => at,
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<LocationRecord>, DbError> {
        self.cache
            .run(|lots| async move {
                self.connector().check_operation()?;
                Ok::<_, DbError>(lots.read().await.values().cloned().collect())
            })
            .await
    }

    async fn find_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, LocationRecord>, DbError> {
        self.cache
            .run(|lots| async move {
                self.connector().check_operation()?;
                let lots = lots.read().await;
                Ok::<_, DbError>(ids
                    .iter()
                    .filter_map(|id| lots.get(id).map(|lot| (id.clone(), lot.clone())))
                    .collect())
            })
            .await
    }

    async fn update_availability(
        &self,
        id: &str,
        available: u32,
        at: DateTime<Utc>,
    ) -> Result<LocationRecord, DbError> {
        self.cache
            .run(|lots| async move {
                self.connector().check_operation()?;
                let mut lots = lots.write().await;
                let lot = lots
                    .get_mut(id)
                    .ok_or_else(|| DbError::NotFound(id.to_string()))?;
                lot.available = available;
                lot.last_updated = Some(advance(lot.last_updated, at));
                Ok::<_, DbError>(lot.clone())
            })
            .await
    }

    async fn touch_all(&self, at: DateTime<Utc>) -> Result<u64, DbError> {
        self.cache
            .run(|lots| async move {
                self.connector().check_operation()?;
                let mut lots = lots.write().await;
                for lot in lots.values_mut() {
                    lot.last_updated = Some(advance(lot.last_updated, at));
                }
                Ok::<_, DbError>(lots.len() as u64)
            })
            .await
    }

    async fn health_check(&self) -> Result<(), DbError> {
        self.cache
            .run(|_lots| async move { self.connector().check_operation() })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lots() -> Vec<LocationRecord> {
        vec![
            LocationRecord::new("B", None, "Second St", 20),
            LocationRecord::new("A", None, "First St", 10),
        ]
    }

    #[tokio::test]
    async fn find_all_is_ordered_by_id() {
        let store = MemoryStore::new(lots());
        let all = store.find_all().await.expect("find_all");
        let ids: Vec<&str> = all.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn find_all_survives_failed_probe_with_reconnect() {
        let store = MemoryStore::new(lots());
        store.find_all().await.expect("warm up");
        store.connector().fail_next_probes(1);

        let all = store.find_all().await.expect("reconnected snapshot");
        assert_eq!(all.len(), 2);
        assert_eq!(store.connector().connect_count(), 2);
    }

    #[tokio::test]
    async fn find_all_is_unavailable_when_reconnect_fails() {
        let store = MemoryStore::new(lots());
        store.find_all().await.expect("warm up");
        store.connector().fail_next_probes(1);
        store.connector().fail_next_connects(2);

        let err = store.find_all().await.unwrap_err();
        assert!(matches!(err, DbError::Unavailable(_)));
    }

    #[tokio::test]
    async fn single_refused_connect_is_retried() {
        let store = MemoryStore::new(lots());
        store.connector().fail_next_connects(1);

        let all = store.find_all().await.expect("snapshot after retry");
        assert_eq!(all.len(), 2);
        assert_eq!(store.connector().connect_count(), 1);
    }

    #[tokio::test]
    async fn dropped_operation_is_retried_once() {
        let store = MemoryStore::new(lots());
        store.connector().fail_next_operations(1);
        assert_eq!(store.find_all().await.expect("retried").len(), 2);

        store.connector().fail_next_operations(2);
        assert!(matches!(
            store.find_all().await,
            Err(DbError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn find_by_ids_omits_unknown_ids() {
        let store = MemoryStore::new(lots());
        let found = store
            .find_by_ids(&["A".to_string(), "Z".to_string()])
            .await
            .expect("find_by_ids");
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("A"));
    }

    #[tokio::test]
    async fn update_availability_strictly_advances_timestamp() {
        let store = MemoryStore::new(lots());
        let at = Utc::now();

        let first = store.update_availability("A", 4, at).await.expect("first");
        assert_eq!(first.available, 4);
        assert_eq!(first.last_updated, Some(at));

        // Same instant again: the timestamp must still move forward.
        let second = store.update_availability("A", 6, at).await.expect("second");
        assert_eq!(second.available, 6);
        assert!(second.last_updated > first.last_updated);
    }

    #[tokio::test]
    async fn update_availability_unknown_id_is_not_found() {
        let store = MemoryStore::new(lots());
        let err = store
            .update_availability("nope", 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn touch_all_updates_timestamps_only() {
        let store = MemoryStore::new(lots());
        store.update_availability("A", 3, Utc::now()).await.expect("seed");

        let touched = store.touch_all(Utc::now()).await.expect("touch");
        assert_eq!(touched, 2);
        let a = store.get("A").await.expect("lot A");
        assert_eq!(a.available, 3);
        assert!(store.get("B").await.expect("lot B").last_updated.is_some());
    }
}
