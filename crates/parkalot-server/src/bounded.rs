use std::future::Future;
use std::time::Duration;

use parkalot_db::DbError;

/// Run a store call under `limit`; expiry reads as [`DbError::Unavailable`].
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
        Err(DbError::Unavailable(format!(
            "store call timed out after {}ms",
            limit.as_millis()
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_results() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, DbError>(3) }).await;
        assert_eq!(ok.unwrap(), 3);
    }

    #[tokio::test]
    async fn expiry_is_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DbError>(())
        };
        let err = bounded(Duration::from_millis(20), slow).await.unwrap_err();
        assert!(err.is_connection_failure());
        assert!(err.to_string().contains("timed out"));
    }
}
