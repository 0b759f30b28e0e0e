//! Module config intake endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::types::ApiError;
use crate::module::{CallbackResult, ModuleConfigStore, ModuleNotification, UpdateOutcome};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct ModuleConfigApiState {
    pub store: Arc<ModuleConfigStore>,
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub module: String,
    #[serde(default)]
    pub key_values: BTreeMap<String, String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Merge key-values into a module's stored config and apply the changes
pub async fn update(
    State(state): State<ModuleConfigApiState>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateOutcome>, ApiError> {
    if request.module.trim().is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_MODULE",
            "module must not be empty",
        ));
    }
    let outcome = state
        .store
        .update(&request.module, request.key_values)
        .await;
    Ok(Json(outcome))
}

/// Apply a notification directly, bypassing the versioned store
pub async fn notify(
    State(state): State<ModuleConfigApiState>,
    Json(notification): Json<ModuleNotification>,
) -> Result<Json<CallbackResult>, ApiError> {
    if notification.module.trim().is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_MODULE",
            "module must not be empty",
        ));
    }
    let result = state.store.callback().notify(notification).await;
    Ok(Json(result))
}

pub fn routes(store: Arc<ModuleConfigStore>) -> Router<()> {
    Router::new()
        .route("/api/v1/module/config/update", post(update))
        .route("/api/v1/module/config/notify", post(notify))
        .with_state(ModuleConfigApiState { store })
}
