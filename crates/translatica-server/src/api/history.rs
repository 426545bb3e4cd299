//! Translation history endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use translatica_core::TranslationRecord;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub translations: Vec<TranslationRecord>,
}

/// Most recent translations, newest first.
pub async fn list_recent(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let store = state
        .history_store
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Translation history is disabled"))?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let translations = store.recent(limit).await.map_err(|e| {
        warn!("Failed to read translation history: {}", e);
        ApiError::internal("Failed to read translation history")
    })?;

    Ok(Json(HistoryResponse { translations }))
}
