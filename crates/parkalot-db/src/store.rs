use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkalot_core::LocationRecord;

use crate::DbError;

/// Read and write access to the parking-lot collection.
///
/// A connection-class failure inside any method has already been retried
/// once against a fresh connection by the time it reaches the caller, and is
/// reported as [`DbError::Unavailable`].
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Every lot, ordered by id.
    async fn find_all(&self) -> Result<Vec<LocationRecord>, DbError>;

    /// Lots whose id is in `ids`. Unknown ids are absent from the map.
    async fn find_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, LocationRecord>, DbError>;

    /// Atomically set `available` and advance `last_updated` for one lot.
    ///
    /// The stored `last_updated` becomes `at`, or one microsecond past its
    /// previous value if `at` is not later, so it always strictly increases.
    /// Returns the updated record, or [`DbError::NotFound`].
    async fn update_availability(
        &self,
        id: &str,
        available: u32,
        at: DateTime<Utc>,
    ) -> Result<LocationRecord, DbError>;

    /// Advance `last_updated` on every lot without touching counts.
    /// Returns the number of lots touched.
    async fn touch_all(&self, at: DateTime<Utc>) -> Result<u64, DbError>;

    /// Force a liveness probe.
    async fn health_check(&self) -> Result<(), DbError>;
}
