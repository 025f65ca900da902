use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use parkalot_core::LocationRecord;
use serde::Serialize;

use crate::bounded::bounded;
use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LotItem {
    pub id: String,
    pub name: String,
    pub location_label: String,
    pub total_spaces: u32,
    pub available_spots: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<LocationRecord> for LotItem {
    fn from(lot: LocationRecord) -> Self {
        Self {
            id: lot.id,
            name: lot.name,
            location_label: lot.location_label,
            total_spaces: lot.total_spaces,
            available_spots: lot.available,
            last_updated: lot.last_updated,
        }
    }
}

pub(super) async fn list_lots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<LotItem>>>, ApiError> {
    let lots = bounded(state.store_timeout, state.store.find_all())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: lots.into_iter().map(LotItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
