//! Lazily-connected, probed connection handle.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::DbError;

/// Opens and health-checks handles for a [`ConnectionCache`].
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    /// Open a fresh handle.
    async fn connect(&self) -> Result<Self::Handle, DbError>;

    /// Lightweight liveness check against an existing handle.
    async fn probe(&self, handle: &Self::Handle) -> Result<(), DbError>;
}

struct Slot<H> {
    handle: H,
    probed_at: Instant,
}

/// Owns at most one live handle produced by a [`Connector`].
///
/// The first [`acquire`](Self::acquire) connects. Later calls reuse the
/// cached handle, probing it first when the last successful probe is older
/// than `probe_interval`. A failed probe drops the handle. Every connect is
/// attempted at most twice; if both fail the caller gets
/// [`DbError::Unavailable`].
pub struct ConnectionCache<C: Connector> {
    connector: C,
    probe_interval: Duration,
    slot: Mutex<Option<Slot<C::Handle>>>,
}

impl<C: Connector> ConnectionCache<C> {
    #[must_use]
    pub fn new(connector: C, probe_interval: Duration) -> Self {
        Self {
            connector,
            probe_interval,
            slot: Mutex::new(None),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return a live handle, connecting or reconnecting as needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] if no handle can be established.
    pub async fn acquire(&self) -> Result<C::Handle, DbError> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            let handle = cached.handle.clone();
            if cached.probed_at.elapsed() < self.probe_interval {
                return Ok(handle);
            }
            match self.connector.probe(&handle).await {
                Ok(()) => {
                    *slot = Some(Slot {
                        handle: handle.clone(),
                        probed_at: Instant::now(),
                    });
                    return Ok(handle);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "store: liveness probe failed; reconnecting");
                    *slot = None;
                }
            }
        }

        let handle = match self.connector.connect().await {
            Ok(handle) => handle,
            Err(first) => {
                tracing::warn!(error = %first, "store: connect failed; retrying once");
                self.connector.connect().await.map_err(|e| {
                    tracing::error!(error = %e, "store: connect failed");
                    DbError::Unavailable(e.to_string())
                })?
            }
        };
        *slot = Some(Slot {
            handle: handle.clone(),
            probed_at: Instant::now(),
        });
        tracing::debug!("store: connection established");
        Ok(handle)
    }

    /// Drop the cached handle so the next acquire reconnects.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Run `op` against a live handle.
    ///
    /// If `op` fails with a connection-class error the handle is discarded,
    /// a new one is acquired, and `op` runs exactly once more. A second
    /// connection failure surfaces as [`DbError::Unavailable`]; other errors
    /// pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns on its final attempt, or
    /// [`DbError::Unavailable`] if the store cannot be reached.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, DbError>
    where
        F: Fn(C::Handle) -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let handle = self.acquire().await?;
        match op(handle).await {
            Err(e) if e.is_connection_failure() => {
                tracing::warn!(error = %e, "store: operation lost its connection; retrying once");
                self.invalidate().await;
                let handle = self.acquire().await?;
                op(handle).await.map_err(|e| {
                    if e.is_connection_failure() {
                        DbError::Unavailable(e.to_string())
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Hands out increasing generation numbers; fails scripted probes/connects.
    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
        probes: AtomicUsize,
        failing_probes: AtomicUsize,
        failing_connects: AtomicUsize,
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Handle = usize;

        async fn connect(&self) -> Result<usize, DbError> {
            if take(&self.failing_connects) {
                return Err(DbError::Unavailable("refused".into()));
            }
            Ok(self.connects.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn probe(&self, _handle: &usize) -> Result<(), DbError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if take(&self.failing_probes) {
                return Err(DbError::Unavailable("ping timed out".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_acquire_connects_lazily() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        assert_eq!(cache.connector().connects.load(Ordering::SeqCst), 0);

        let handle = cache.acquire().await.expect("acquire");
        assert_eq!(handle, 1);
        assert_eq!(cache.connector().probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_connect_failure_is_retried() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        cache.connector().failing_connects.store(1, Ordering::SeqCst);

        let handle = cache.acquire().await.expect("second connect succeeds");
        assert_eq!(handle, 1);
    }

    #[tokio::test]
    async fn two_connect_failures_are_unavailable() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        cache.connector().failing_connects.store(2, Ordering::SeqCst);

        assert!(matches!(
            cache.acquire().await,
            Err(DbError::Unavailable(_))
        ));
        assert_eq!(cache.acquire().await.expect("recovered"), 1);
    }

    #[tokio::test]
    async fn healthy_handle_is_reused_after_probe() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        cache.acquire().await.expect("first");
        let second = cache.acquire().await.expect("second");

        assert_eq!(second, 1);
        assert_eq!(cache.connector().connects.load(Ordering::SeqCst), 1);
        assert_eq!(cache.connector().probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probe_is_skipped_within_interval() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::from_secs(3600));
        cache.acquire().await.expect("first");
        cache.acquire().await.expect("second");
        assert_eq!(cache.connector().probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_probe_triggers_reconnect() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        cache.acquire().await.expect("first");
        cache.connector().failing_probes.store(1, Ordering::SeqCst);

        let handle = cache.acquire().await.expect("reconnected");
        assert_eq!(handle, 2);
        assert_eq!(cache.connector().connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_probe_and_failed_reconnect_is_unavailable() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        cache.acquire().await.expect("first");
        cache.connector().failing_probes.store(1, Ordering::SeqCst);
        cache.connector().failing_connects.store(2, Ordering::SeqCst);

        let err = cache.acquire().await.unwrap_err();
        assert!(matches!(err, DbError::Unavailable(_)));

        // The slot was cleared, so the next call connects again.
        let handle = cache.acquire().await.expect("recovered");
        assert_eq!(handle, 2);
    }

    #[tokio::test]
    async fn run_retries_once_on_connection_failure() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache
            .run(|handle| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(DbError::Sqlx(sqlx::Error::PoolClosed))
                    } else {
                        Ok(handle)
                    }
                }
            })
            .await
            .expect("retry succeeds");

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_gives_up_after_second_connection_failure() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        let calls = AtomicUsize::new(0);

        let err = cache
            .run(|_handle| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DbError::Sqlx(sqlx::Error::PoolTimedOut)) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Unavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_does_not_retry_query_errors() {
        let cache = ConnectionCache::new(CountingConnector::default(), Duration::ZERO);
        let calls = AtomicUsize::new(0);

        let err = cache
            .run(|_handle| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DbError::NotFound("9".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::NotFound(ref id) if id == "9"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
