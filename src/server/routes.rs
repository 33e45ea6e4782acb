//! Router definition

use crate::{receive, send, server::api, server::AppState, ui::web};
use axum::{extract::DefaultBodyLimit, routing::*, Router};
use tower_http::trace::TraceLayer;

/// One router serves both modes; handlers reject requests for the other mode.
pub fn create_router(state: &AppState) -> Router {
    Router::new()
        .route("/", get(web::serve_index))
        .route("/health", get(|| async { "OK" }))
        .route("/api/info", get(api::info))
        .route("/api/events", get(api::events))
        .route("/api/log", get(api::log))
        .route("/api/cancel", post(api::cancel))
        .route("/api/download", get(send::handlers::download))
        .route("/api/upload", post(receive::handlers::upload))
        .layer(DefaultBodyLimit::max(state.config.upload_limit()))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
}
