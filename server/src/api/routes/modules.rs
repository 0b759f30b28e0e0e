//! Configured module listing

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::types::ApiError;
use crate::engine::{ConfigManager, PipelineModule};

pub async fn list_modules(
    State(configs): State<ConfigManager>,
) -> Result<Json<Vec<String>>, ApiError> {
    let mut names = configs.module_names().await?;
    names.sort();
    Ok(Json(names))
}

pub async fn get_module(
    State(configs): State<ConfigManager>,
    Path(name): Path<String>,
) -> Result<Json<PipelineModule>, ApiError> {
    configs
        .get_config(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("MODULE_NOT_FOUND", format!("module {} does not exist", name)))
}

pub fn routes(configs: ConfigManager) -> Router<()> {
    Router::new()
        .route("/api/v1/modules", get(list_modules))
        .route("/api/v1/modules/{name}", get(get_module))
        .with_state(configs)
}
