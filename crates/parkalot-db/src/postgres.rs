//! Postgres-backed [`LocationStore`] over the `parking_lots` table.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkalot_core::{default_lot_name, LocationRecord};
use sqlx::PgPool;

use crate::cache::{ConnectionCache, Connector};
use crate::store::LocationStore;
use crate::{connect_pool, ping, DbError, PoolConfig};

const LOT_COLUMNS: &str = "id, name, location_label, total_spaces, available, last_updated";

/// A row from the `parking_lots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ParkingLotRow {
    id: String,
    name: Option<String>,
    location_label: String,
    total_spaces: i32,
    available: i32,
    last_updated: Option<DateTime<Utc>>,
}

impl TryFrom<ParkingLotRow> for LocationRecord {
    type Error = DbError;

    fn try_from(row: ParkingLotRow) -> Result<Self, Self::Error> {
        let non_negative = |field: &str, value: i32| {
            u32::try_from(value).map_err(|_| DbError::InvalidRow {
                id: row.id.clone(),
                reason: format!("{field} is negative ({value})"),
            })
        };
        let total_spaces = non_negative("total_spaces", row.total_spaces)?;
        let available = non_negative("available", row.available)?;

        let name = row
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_lot_name(&row.id, &row.location_label));

        Ok(LocationRecord {
            id: row.id,
            name,
            location_label: row.location_label,
            total_spaces,
            available,
            last_updated: row.last_updated,
        })
    }
}

/// Produces pools for a [`PgStore`].
pub enum PgConnector {
    /// Build a new pool from a URL on each connect.
    Url {
        database_url: String,
        config: PoolConfig,
    },
    /// Hand out clones of an already-built pool.
    Pool(PgPool),
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self) -> Result<PgPool, DbError> {
        match self {
            PgConnector::Url {
                database_url,
                config,
            } => Ok(connect_pool(database_url, *config).await?),
            PgConnector::Pool(pool) => Ok(pool.clone()),
        }
    }

    async fn probe(&self, pool: &PgPool) -> Result<(), DbError> {
        ping(pool).await?;
        Ok(())
    }
}

pub struct PgStore {
    cache: ConnectionCache<PgConnector>,
}

impl PgStore {
    /// Create a store that connects on first use.
    #[must_use]
    pub fn new(database_url: impl Into<String>, config: PoolConfig, probe_interval: Duration) -> Self {
        let connector = PgConnector::Url {
            database_url: database_url.into(),
            config,
        };
        Self {
            cache: ConnectionCache::new(connector, probe_interval),
        }
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, probe_interval: Duration) -> Self {
        Self {
            cache: ConnectionCache::new(PgConnector::Pool(pool), probe_interval),
        }
    }

    /// Return the pool, connecting if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] if no connection can be made.
    pub async fn pool(&self) -> Result<PgPool, DbError> {
        self.cache.acquire().await
    }

    /// Insert a lot, or replace its descriptive fields if the id exists.
    ///
    /// Used for provisioning and test seeding; `available` and
    /// `last_updated` are written as given.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails or a count exceeds `i32`.
    pub async fn upsert_lot(&self, lot: &LocationRecord) -> Result<(), DbError> {
        let total_spaces = to_db_count(&lot.id, "total_spaces", lot.total_spaces)?;
        let available = to_db_count(&lot.id, "available", lot.available)?;

        self.cache
            .run(|pool| async move {
                sqlx::query(
                    "INSERT INTO parking_lots \
                         (id, name, location_label, total_spaces, available, last_updated) \
                     VALUES ($1, $2, $3, $4, $5, $6) \
                     ON CONFLICT (id) DO UPDATE SET \
                         name           = EXCLUDED.name, \
                         location_label = EXCLUDED.location_label, \
                         total_spaces   = EXCLUDED.total_spaces, \
                         available      = EXCLUDED.available, \
                         last_updated   = EXCLUDED.last_updated",
                )
                .bind(&lot.id)
                .bind(&lot.name)
                .bind(&lot.location_label)
                .bind(total_spaces)
                .bind(available)
                .bind(lot.last_updated)
                .execute(&pool)
                .await?;
                Ok::<_, DbError>(())
            })
            .await
    }
}

fn to_db_count(id: &str, field: &str, value: u32) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::InvalidRow {
        id: id.to_string(),
        reason: format!("{field} {value} does not fit in INTEGER"),
    })
}

#[async_trait]
impl LocationStore for PgStore {
    async fn find_all(&self) -> Result<Vec<LocationRecord>, DbError> {
        let rows = self
            .cache
            .run(|pool| async move {
                let rows = sqlx::query_as::<_, ParkingLotRow>(&format!(
                    "SELECT {LOT_COLUMNS} FROM parking_lots ORDER BY id ASC"
                ))
                .fetch_all(&pool)
                .await?;
                Ok::<_, DbError>(rows)
            })
            .await?;
        rows.into_iter().map(LocationRecord::try_from).collect()
    }

    async fn find_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, LocationRecord>, DbError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .cache
            .run(|pool| async move {
                let rows = sqlx::query_as::<_, ParkingLotRow>(&format!(
                    "SELECT {LOT_COLUMNS} FROM parking_lots WHERE id = ANY($1::text[])"
                ))
                .bind(ids)
                .fetch_all(&pool)
                .await?;
                Ok::<_, DbError>(rows)
            })
            .await?;
        rows.into_iter()
            .map(|row| LocationRecord::try_from(row).map(|lot| (lot.id.clone(), lot)))
            .collect()
    }

    async fn update_availability(
        &self,
        id: &str,
        available: u32,
        at: DateTime<Utc>,
    ) -> Result<LocationRecord, DbError> {
        let available = to_db_count(id, "available", available)?;
        let row = self
            .cache
            .run(|pool| async move {
                let row = sqlx::query_as::<_, ParkingLotRow>(&format!(
                    "UPDATE parking_lots \
                     SET available = $2, \
                         last_updated = GREATEST($3, last_updated + INTERVAL '1 microsecond') \
                     WHERE id = $1 \
                     RETURNING {LOT_COLUMNS}"
                ))
                .bind(id)
                .bind(available)
                .bind(at)
                .fetch_optional(&pool)
                .await?;
                Ok::<_, DbError>(row)
            })
            .await?;
        row.ok_or_else(|| DbError::NotFound(id.to_string()))
            .and_then(LocationRecord::try_from)
    }

    async fn touch_all(&self, at: DateTime<Utc>) -> Result<u64, DbError> {
        self.cache
            .run(|pool| async move {
                let touched = sqlx::query(
                    "UPDATE parking_lots \
                     SET last_updated = GREATEST($1, last_updated + INTERVAL '1 microsecond')",
                )
                .bind(at)
                .execute(&pool)
                .await?
                .rows_affected();
                Ok::<_, DbError>(touched)
            })
            .await
    }

    async fn health_check(&self) -> Result<(), DbError> {
        self.cache
            .run(|pool| async move {
                ping(&pool).await?;
                Ok::<_, DbError>(())
            })
            .await
    }
}
