//! Translation endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Longest accepted request text, in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct TranslationRequest {
    /// English text to translate
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslationResponse {
    pub translation: String,
}

/// Translate English text to Spanish.
pub async fn translate(
    State(state): State<AppState>,
    Json(req): Json<TranslationRequest>,
) -> Result<Json<TranslationResponse>, ApiError> {
    if let Some(text) = req.text.as_deref() {
        let chars = text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(ApiError::bad_request(format!(
                "Text must be at most {} characters, got {}",
                MAX_TEXT_CHARS, chars
            )));
        }
    }

    let _permit = state.acquire_permit().await?;
    let translation = state.service.translate(req.text.as_deref()).await?;

    if let Some(source) = req.text.as_deref() {
        if state.history.record(source.trim(), &translation) {
            info!("Translation queued for history");
        }
    }

    Ok(Json(TranslationResponse { translation }))
}
