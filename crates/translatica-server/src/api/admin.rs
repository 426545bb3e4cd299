//! Model administration endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

pub const LOAD_FAILED: &str = "Failed to load model";

#[derive(Debug, Serialize)]
pub struct ModelActionResponse {
    pub status: &'static str,
    pub message: String,
}

/// Load the translation model. Returns immediately when it is already loaded.
pub async fn load_model(State(state): State<AppState>) -> Result<Json<ModelActionResponse>, ApiError> {
    if state.manager.is_loaded() {
        return Ok(Json(ModelActionResponse {
            status: "loaded",
            message: "Model already loaded".to_string(),
        }));
    }

    info!("Loading model from {:?}", state.manager.artifact_dir());
    state.manager.load().await.map_err(|e| {
        warn!("Model load failed: {}", e);
        ApiError::internal(LOAD_FAILED)
    })?;

    Ok(Json(ModelActionResponse {
        status: "loaded",
        message: "Model loaded".to_string(),
    }))
}

/// Unload the translation model, waiting for in-flight translations.
pub async fn unload_model(State(state): State<AppState>) -> Json<ModelActionResponse> {
    state.manager.unload().await;
    Json(ModelActionResponse {
        status: "unloaded",
        message: "Model unloaded".to_string(),
    })
}
