//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use super::auth::{AuthState, BasicAuth, require_auth};
use super::routes::{health, module_config, modules, pull, stat};
use crate::core::config::ServerConfig;
use crate::core::constants::DEFAULT_BODY_LIMIT;
use crate::core::shutdown::ShutdownService;
use crate::engine::Engine;
use crate::module::ModuleConfigStore;

pub struct ApiServer {
    engine: Engine,
    store: Arc<ModuleConfigStore>,
    auth: Arc<BasicAuth>,
}

impl ApiServer {
    pub fn new(engine: Engine, store: Arc<ModuleConfigStore>, auth: Arc<BasicAuth>) -> Self {
        Self {
            engine,
            store,
            auth,
        }
    }

    pub fn router(&self) -> Router {
        let pull_routes = Arc::clone(&self.engine.routes);
        let auth_state: AuthState = self.auth.clone();

        Router::new()
            .route("/api/v1/health", get(health::health))
            .merge(module_config::routes(Arc::clone(&self.store)))
            .merge(modules::routes(self.engine.configs.clone()))
            .merge(stat::routes(Arc::clone(&self.engine.stats)))
            .fallback(move |req: Request| pull::serve(Arc::clone(&pull_routes), req))
            .layer(axum::middleware::from_fn_with_state(auth_state, require_auth))
            .layer(CompressionLayer::new())
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
    }

    /// Serve until shutdown is triggered
    pub async fn start(self, config: &ServerConfig, shutdown: &ShutdownService) -> Result<()> {
        let addr = SocketAddr::new(config.host.parse()?, config.port);
        let router = self.router();

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "HTTP server listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await?;

        tracing::debug!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Credentials;
    use crate::api::types::PROMETHEUS_CONTENT_TYPE;
    use crate::engine::{NO_EXECUTABLE_PIPELINE, PATH_NOT_REGISTERED, test_support};
    use crate::module::ModuleCallback;
    use axum::body::{Body, to_bytes};
    use axum::http::{StatusCode, header};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use tokio::sync::watch;
    use tower::ServiceExt;

    const PULL_MODULE: &str = r#"{
        "name": "web",
        "pipelines": [{
            "name": "p",
            "config": { "scheduleStrategy": "Trigger", "exposeUrl": "/metrics/web" },
            "structure": {
                "inputs": [{ "pluginName": "test" }],
                "processors": [{ "pluginName": "test" }],
                "exporter": { "pluginName": "test" }
            }
        }]
    }"#;

    struct TestServer {
        router: Router,
        engine: Engine,
        _shutdown: watch::Sender<bool>,
    }

    fn server(credentials: Option<Credentials>) -> TestServer {
        let (shutdown, rx) = watch::channel(false);
        let (engine, _handles) = Engine::spawn(test_support::plugins(), 4, rx).unwrap();
        let auth = Arc::new(BasicAuth::new(credentials));
        let callback = Arc::new(ModuleCallback::new(engine.configs.clone(), Arc::clone(&auth)));
        let store = Arc::new(ModuleConfigStore::new(callback));
        let router = ApiServer::new(engine.clone(), store, auth).router();
        TestServer {
            router,
            engine,
            _shutdown: shutdown,
        }
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn update_body() -> serde_json::Value {
        serde_json::json!({
            "module": "web",
            "keyValues": { "pipeline.config": PULL_MODULE }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let s = server(None);
        let response = s.router.oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_update_then_pull() {
        let s = server(None);

        let response = s
            .router
            .clone()
            .oneshot(post_json("/api/v1/module/config/update", update_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(outcome["success"], true);
        assert_eq!(outcome["version"], 1);

        let response = s.router.clone().oneshot(get("/metrics/web")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
        assert_eq!(body_string(response).await, test_support::EXPORTED);

        let response = s.router.oneshot(get("/api/v1/modules")).await.unwrap();
        let names: Vec<String> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(names, vec!["web".to_string()]);
    }

    #[tokio::test]
    async fn test_notify_applies_module() {
        let s = server(None);
        let body = serde_json::json!({
            "process": "agent",
            "module": "web",
            "updatedKeyValues": { "pipeline.config": PULL_MODULE }
        });

        let response = s
            .router
            .clone()
            .oneshot(post_json("/api/v1/module/config/notify", body))
            .await
            .unwrap();
        let result: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(result["success"], true);

        let response = s.router.oneshot(get("/api/v1/modules/web")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_module_is_404() {
        let s = server(None);
        let response = s.router.oneshot(get("/api/v1/modules/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unregistered_path_is_404() {
        let s = server(None);
        let response = s.router.oneshot(get("/metrics/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(
            s.engine.routes.pull("/metrics/unknown").await,
            PATH_NOT_REGISTERED.as_bytes()
        );
    }

    #[tokio::test]
    async fn test_drained_path_reports_in_body() {
        let s = server(None);
        s.engine.routes.register_route("/metrics/drained");

        let response = s.router.oneshot(get("/metrics/drained")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, NO_EXECUTABLE_PIPELINE);
    }

    #[tokio::test]
    async fn test_stat_endpoint() {
        let s = server(None);
        s.router
            .clone()
            .oneshot(post_json("/api/v1/module/config/update", update_body()))
            .await
            .unwrap();
        s.router.clone().oneshot(get("/metrics/web")).await.unwrap();

        let response = s.router.oneshot(get("/metrics/stat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn test_basic_auth_guards_routes() {
        let s = server(Some(Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }));

        let response = s.router.clone().oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let request = axum::http::Request::builder()
            .uri("/api/v1/health")
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", STANDARD.encode("admin:secret")),
            )
            .body(Body::empty())
            .unwrap();
        let response = s.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_module_rejected() {
        let s = server(None);
        let response = s
            .router
            .oneshot(post_json(
                "/api/v1/module/config/update",
                serde_json::json!({ "module": "", "keyValues": {} }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
