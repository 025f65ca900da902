//! The refresh cycle: locate, infer, count and persist for every lot.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parkalot_core::{AppConfig, LocationRecord};
use parkalot_db::LocationStore;
use parkalot_inference::{AvailabilityCounter, ImageLocator, InferenceAdapter, InferenceError};
use serde::Serialize;

use super::guard::CycleGuard;
use crate::bounded::bounded;

/// Per-lot stage a skip happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Locating,
    Inferring,
    Persisting,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Locating => write!(f, "locating"),
            Step::Inferring => write!(f, "inferring"),
            Step::Persisting => write!(f, "persisting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotUpdate {
    pub lot_id: String,
    pub previous: u32,
    pub available: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLot {
    pub lot_id: String,
    pub step: Step,
    pub reason: String,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    pub updated: Vec<LotUpdate>,
    pub skipped: Vec<SkippedLot>,
    /// Set when the lot list itself could not be read; nothing else ran.
    pub fetch_error: Option<String>,
}

pub struct RefreshPipeline {
    store: Arc<dyn LocationStore>,
    locator: ImageLocator,
    adapter: Arc<dyn InferenceAdapter>,
    counter: AvailabilityCounter,
    inference_timeout: Duration,
    store_timeout: Duration,
    guard: CycleGuard,
}

impl RefreshPipeline {
    pub fn new(
        store: Arc<dyn LocationStore>,
        locator: ImageLocator,
        adapter: Arc<dyn InferenceAdapter>,
        counter: AvailabilityCounter,
    ) -> Self {
        Self {
            store,
            locator,
            adapter,
            counter,
            inference_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            guard: CycleGuard::new("refresh"),
        }
    }

    pub fn from_config(
        store: Arc<dyn LocationStore>,
        adapter: Arc<dyn InferenceAdapter>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            store,
            ImageLocator::from_config(config),
            adapter,
            AvailabilityCounter::from_config(config),
        )
        .with_timeouts(
            Duration::from_secs(config.inference_timeout_secs),
            Duration::from_secs(config.store_timeout_secs),
        )
    }

    #[must_use]
    pub fn with_timeouts(mut self, inference: Duration, store: Duration) -> Self {
        self.inference_timeout = inference;
        self.store_timeout = store;
        self
    }

    pub fn locator(&self) -> &ImageLocator {
        &self.locator
    }

    /// Run a cycle unless one is already in flight.
    pub async fn run_guarded(&self) -> Option<CycleReport> {
        let _running = self.guard.try_enter()?;
        Some(self.run_cycle().await)
    }

    /// Process every lot in `find_all` order, one at a time.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let lots = match bounded(self.store_timeout, self.store.find_all()).await {
            Ok(lots) => lots,
            Err(e) => {
                tracing::error!(error = %e, "scheduler: failed to load parking lots");
                return CycleReport {
                    fetch_error: Some(e.to_string()),
                    ..CycleReport::default()
                };
            }
        };

        tracing::info!(count = lots.len(), "scheduler: refreshing parking lots");

        let mut report = CycleReport::default();
        for lot in &lots {
            match self.refresh_lot(lot).await {
                Ok(update) => report.updated.push(update),
                Err(skip) => {
                    tracing::warn!(
                        lot_id = %skip.lot_id,
                        step = %skip.step,
                        reason = %skip.reason,
                        "scheduler: skipping lot"
                    );
                    report.skipped.push(skip);
                }
            }
        }

        tracing::info!(
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "scheduler: refresh cycle complete"
        );
        report
    }

    async fn refresh_lot(&self, lot: &LocationRecord) -> Result<LotUpdate, SkippedLot> {
        let skip = |step: Step, reason: String| SkippedLot {
            lot_id: lot.id.clone(),
            step,
            reason,
        };

        let image = self
            .locator
            .locate(&lot.id)
            .await
            .map_err(|e| skip(Step::Locating, e.to_string()))?;

        let detections = tokio::time::timeout(self.inference_timeout, self.adapter.infer(&image))
            .await
            .unwrap_or_else(|_| Err(InferenceError::Timeout(self.inference_timeout.as_secs())))
            .map_err(|e| skip(Step::Inferring, e.to_string()))?;

        let available = self.counter.count(&detections);
        tracing::debug!(
            lot_id = %lot.id,
            image = %image.name(),
            detections = detections.len(),
            available,
            threshold = self.counter.threshold(),
            "scheduler: computed availability"
        );
        if available > lot.total_spaces {
            tracing::warn!(
                lot_id = %lot.id,
                available,
                total_spaces = lot.total_spaces,
                "scheduler: detected more free spaces than lot capacity"
            );
        }

        let updated = bounded(
            self.store_timeout,
            self.store.update_availability(&lot.id, available, Utc::now()),
        )
        .await
        .map_err(|e| skip(Step::Persisting, e.to_string()))?;

        tracing::info!(
            lot_id = %lot.id,
            previous = lot.available,
            available = updated.available,
            change = i64::from(updated.available) - i64::from(lot.available),
            "scheduler: lot updated"
        );

        Ok(LotUpdate {
            lot_id: updated.id,
            previous: lot.available,
            available: updated.available,
            last_updated: updated.last_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use parkalot_core::Detection;
    use parkalot_db::{DbError, MemoryStore};
    use parkalot_inference::{ImageMode, ImageRef, StubAdapter};

    use super::*;

    /// Returns canned detections keyed by image file name; unknown names fail.
    struct ScriptedAdapter {
        by_file: HashMap<String, Vec<Detection>>,
        delay: Option<Duration>,
    }

    impl ScriptedAdapter {
        fn new(entries: &[(&str, Vec<Detection>)]) -> Self {
            Self {
                by_file: entries
                    .iter()
                    .map(|(name, d)| ((*name).to_string(), d.clone()))
                    .collect(),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl InferenceAdapter for ScriptedAdapter {
        async fn infer(&self, image: &ImageRef) -> Result<Vec<Detection>, InferenceError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let ImageRef::Path(path) = image else {
                panic!("expected a path");
            };
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.by_file
                .get(&name)
                .cloned()
                .ok_or(InferenceError::UnexpectedStatus {
                    status: 502,
                    url: format!("http://detect.test/{name}"),
                })
        }
    }

    /// Delegates to a [`MemoryStore`] but refuses writes for chosen lots.
    struct FlakyWrites {
        inner: MemoryStore,
        refuse: HashSet<String>,
    }

    #[async_trait]
    impl LocationStore for FlakyWrites {
        async fn find_all(&self) -> Result<Vec<LocationRecord>, DbError> {
            self.inner.find_all().await
        }

        async fn find_by_ids(
            &self,
            ids: &[String],
        ) -> Result<HashMap<String, LocationRecord>, DbError> {
            self.inner.find_by_ids(ids).await
        }

        async fn update_availability(
            &self,
            id: &str,
            available: u32,
            at: DateTime<Utc>,
        ) -> Result<LocationRecord, DbError> {
            if self.refuse.contains(id) {
                return Err(DbError::Unavailable("connection reset".into()));
            }
            self.inner.update_availability(id, available, at).await
        }

        async fn touch_all(&self, at: DateTime<Utc>) -> Result<u64, DbError> {
            self.inner.touch_all(at).await
        }

        async fn health_check(&self) -> Result<(), DbError> {
            self.inner.health_check().await
        }
    }

    fn lot(id: &str, total: u32, available: u32) -> LocationRecord {
        let mut lot = LocationRecord::new(id, None, format!("{id} Garage"), total);
        lot.available = available;
        lot
    }

    fn mixed() -> Vec<Detection> {
        vec![
            Detection::new("empty", 0.9),
            Detection::new("occupied", 0.95),
            Detection::new("empty", 0.4),
        ]
    }

    fn production() -> ImageLocator {
        ImageLocator::new(ImageMode::Production, "/srv/images")
    }

    fn pipeline(
        store: Arc<dyn LocationStore>,
        locator: ImageLocator,
        adapter: impl InferenceAdapter + 'static,
    ) -> RefreshPipeline {
        RefreshPipeline::new(store, locator, Arc::new(adapter), AvailabilityCounter::default())
    }

    #[tokio::test]
    async fn updates_lots_with_computed_count() {
        let store = Arc::new(MemoryStore::new([lot("1", 10, 6), lot("2", 10, 0)]));
        let adapter = ScriptedAdapter::new(&[("lot-1.jpg", mixed()), ("lot-2.jpg", mixed())]);
        let pipeline = pipeline(store.clone(), production(), adapter);

        let report = pipeline.run_cycle().await;
        assert!(report.skipped.is_empty());
        assert_eq!(report.updated.len(), 2);
        assert_eq!(report.updated[0].previous, 6);
        assert_eq!(report.updated[0].available, 1);

        let first = store.get("1").await.unwrap();
        assert_eq!(first.available, 1);
        assert!(first.last_updated.is_some());

        pipeline.run_cycle().await;
        let second = store.get("1").await.unwrap();
        assert!(second.last_updated > first.last_updated);
        assert_eq!(second.available, 1);
    }

    #[tokio::test]
    async fn inference_failure_skips_only_that_lot() {
        let store = Arc::new(MemoryStore::new([
            lot("1", 10, 0),
            lot("2", 10, 7),
            lot("3", 10, 0),
        ]));
        let adapter = ScriptedAdapter::new(&[("lot-1.jpg", mixed()), ("lot-3.jpg", mixed())]);

        let report = pipeline(store.clone(), production(), adapter).run_cycle().await;

        let updated: Vec<&str> = report.updated.iter().map(|u| u.lot_id.as_str()).collect();
        assert_eq!(updated, vec!["1", "3"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].lot_id, "2");
        assert_eq!(report.skipped[0].step, Step::Inferring);

        let untouched = store.get("2").await.unwrap();
        assert_eq!(untouched.available, 7);
        assert!(untouched.last_updated.is_none());
    }

    #[tokio::test]
    async fn missing_fixture_image_skips_at_locating() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("lot-1.jpeg"), b"frame").expect("write fixture");
        let store = Arc::new(MemoryStore::new([lot("1", 20, 0), lot("2", 20, 0)]));
        let locator = ImageLocator::new(ImageMode::Fixture, dir.path());

        let report = pipeline(store.clone(), locator, StubAdapter::default())
            .run_cycle()
            .await;

        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.updated[0].lot_id, "1");
        assert_eq!(report.skipped[0].step, Step::Locating);
        assert!(report.skipped[0].reason.contains("no image found for lot 2"));
    }

    #[tokio::test]
    async fn persist_failure_skips_and_continues() {
        let store = Arc::new(FlakyWrites {
            inner: MemoryStore::new([lot("1", 10, 4), lot("2", 10, 0)]),
            refuse: HashSet::from(["1".to_string()]),
        });
        let adapter = ScriptedAdapter::new(&[("lot-1.jpg", mixed()), ("lot-2.jpg", mixed())]);

        let report = pipeline(store.clone(), production(), adapter).run_cycle().await;

        assert_eq!(report.skipped[0].lot_id, "1");
        assert_eq!(report.skipped[0].step, Step::Persisting);
        assert_eq!(report.updated[0].lot_id, "2");
        assert_eq!(store.inner.get("1").await.unwrap().available, 4);
    }

    #[tokio::test]
    async fn unreadable_lot_list_ends_cycle_cleanly() {
        let store = Arc::new(MemoryStore::new([lot("1", 10, 0)]));
        store.connector().fail_next_connects(2);

        let report = pipeline(store, production(), ScriptedAdapter::new(&[]))
            .run_cycle()
            .await;

        assert!(report.fetch_error.is_some());
        assert!(report.updated.is_empty() && report.skipped.is_empty());
    }

    #[tokio::test]
    async fn slow_inference_times_out() {
        let store = Arc::new(MemoryStore::new([lot("1", 10, 0)]));
        let mut adapter = ScriptedAdapter::new(&[("lot-1.jpg", mixed())]);
        adapter.delay = Some(Duration::from_secs(5));

        let report = pipeline(store, production(), adapter)
            .with_timeouts(Duration::from_millis(20), Duration::from_secs(1))
            .run_cycle()
            .await;

        assert_eq!(report.skipped[0].step, Step::Inferring);
        assert!(report.skipped[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn count_above_capacity_is_persisted() {
        let store = Arc::new(MemoryStore::new([lot("1", 1, 0)]));
        let adapter = ScriptedAdapter::new(&[(
            "lot-1.jpg",
            vec![Detection::new("empty", 0.9), Detection::new("free", 0.8)],
        )]);

        pipeline(store.clone(), production(), adapter).run_cycle().await;
        assert_eq!(store.get("1").await.unwrap().available, 2);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let store = Arc::new(MemoryStore::new([lot("1", 10, 0)]));
        let pipeline = pipeline(
            store,
            production(),
            ScriptedAdapter::new(&[("lot-1.jpg", mixed())]),
        );

        let held = pipeline.guard.try_enter();
        assert!(pipeline.run_guarded().await.is_none());
        drop(held);
        assert!(pipeline.run_guarded().await.is_some());
    }
}
