//! Engine self-observability scrape endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::api::types::{ApiError, PROMETHEUS_CONTENT_TYPE};
use crate::engine::EngineStats;

pub async fn stat(State(stats): State<Arc<EngineStats>>) -> Result<impl IntoResponse, ApiError> {
    let body = stats.render().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode engine stats");
        ApiError::internal("Failed to encode engine stats")
    })?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body))
}

pub fn routes(stats: Arc<EngineStats>) -> Router<()> {
    Router::new()
        .route("/metrics/stat", get(stat))
        .with_state(stats)
}
