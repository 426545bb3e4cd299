//! API routes and handlers

mod admin;
mod health;
mod history;
mod translate;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/translate", post(translate::translate))
        .route("/health", get(health::health_check))
        .route("/history", get(history::list_recent))
        .route("/admin/model/load", post(admin::load_model))
        .route("/admin/model/unload", post(admin::unload_model))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
