use axum::{extract::State, Extension, Json};
use parkalot_core::{DistanceEntry, MergedResult};
use parkalot_db::{merge_distances, MergeOutcome};

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

/// Attach stored lots to a caller-ranked distance list.
///
/// A store outage or timeout yields an empty list with status 200.
pub(super) async fn nearby_lots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(entries): Json<Vec<DistanceEntry>>,
) -> Json<ApiResponse<Vec<MergedResult>>> {
    let outcome = tokio::time::timeout(
        state.store_timeout,
        merge_distances(state.store.as_ref(), &entries),
    )
    .await
    .unwrap_or_else(|_| MergeOutcome::Degraded {
        reason: "store lookup timed out".to_string(),
    });

    if let MergeOutcome::Degraded { reason } = &outcome {
        tracing::warn!(
            request_id = %req_id.0,
            requested = entries.len(),
            reason = %reason,
            "nearby: serving empty result"
        );
    }

    Json(ApiResponse {
        data: outcome.into_results(),
        meta: ResponseMeta::new(req_id.0),
    })
}
