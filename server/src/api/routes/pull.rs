//! Pull endpoints registered at runtime by trigger pipelines
//!
//! Paths are not known when the router is built, so this runs as the
//! router's fallback. Registered paths always answer 200; an empty or
//! drained group is reported in the body text, not the status code.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, header};
use axum::response::{IntoResponse, Response};

use crate::api::middleware;
use crate::api::types::PROMETHEUS_CONTENT_TYPE;
use crate::engine::RouteManager;

/// Serve a registered pull path.
///
/// A path that was never registered gets the API's JSON 404 here, so HTTP
/// clients never see the `PATH_NOT_REGISTERED` text `RouteManager::pull`
/// returns for it.
pub async fn serve(routes: Arc<RouteManager>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    if req.method() != Method::GET || !routes.is_registered(&path) {
        return middleware::handle_404(req).await;
    }

    tracing::trace!(path = %path, "Pull request");
    let body = routes.pull(&path).await;
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}
