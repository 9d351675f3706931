//! API server implementation.
//!
//! Provides health, ready, and API endpoints for the Tally recorder, and
//! composes the config store, the row mutation engine, and the idempotency
//! cache into shared application state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tally_core::config_store::{ConfigStore, MemoryConfigStore};
use tally_core::error::Result;
use tally_core::idempotency::IdempotencyCache;
use tally_sheets::client::{HttpSheetsClient, SheetsClient};
use tally_sheets::engine::RowMutationEngine;

use crate::config::{Config, CorsConfig};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Sheet configuration store.
    store: Arc<dyn ConfigStore>,
    /// Row mutation engine over the Sheets client.
    engine: Arc<RowMutationEngine>,
    /// Idempotency cache shared across concurrent writes.
    idempotency: Arc<IdempotencyCache>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &"<ConfigStore>")
            .field("engine", &"<RowMutationEngine>")
            .field("idempotency_entries", &self.idempotency.len())
            .finish()
    }
}

impl AppState {
    /// Creates application state, building the Sheets client from config.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn ConfigStore>) -> Self {
        let client: Arc<dyn SheetsClient> = Arc::new(HttpSheetsClient::new(
            config.sheets.base_url.clone(),
            config.sheets.to_sheets_auth(),
        ));
        Self::with_sheets_client(config, store, client)
    }

    /// Creates application state with an explicit Sheets client (tests).
    #[must_use]
    pub fn with_sheets_client(
        config: Config,
        store: Arc<dyn ConfigStore>,
        client: Arc<dyn SheetsClient>,
    ) -> Self {
        let idempotency = Arc::new(IdempotencyCache::new(
            config.idempotency_ttl(),
            config.idempotency_max_entries,
        ));
        Self {
            config,
            store,
            engine: Arc::new(RowMutationEngine::new(client)),
            idempotency,
        }
    }

    /// Returns the sheet configuration store.
    #[must_use]
    pub fn config_store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    /// Returns the row mutation engine.
    #[must_use]
    pub fn engine(&self) -> &RowMutationEngine {
        &self.engine
    }

    /// Returns the idempotency cache.
    #[must_use]
    pub fn idempotency(&self) -> &IdempotencyCache {
        &self.idempotency
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// Returns 200 OK if the service is alive. This is a shallow check
/// that doesn't verify dependencies.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
///
/// Returns 200 OK if the service is ready to accept requests; probes the
/// config store, which is the only local dependency.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.config_store().list(&state.config.default_user_id).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!("config store check failed: {e}")),
            }),
        ),
    }
}

/// Serves the generated `OpenAPI` spec.
async fn openapi_json() -> impl IntoResponse {
    match crate::openapi::openapi_json() {
        Ok(spec) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            spec,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("failed to render OpenAPI spec: {e}"),
        ),
    }
}

// ============================================================================
// Server
// ============================================================================

/// The Tally API server.
pub struct Server {
    config: Config,
    store: Arc<dyn ConfigStore>,
    sheets_client: Option<Arc<dyn SheetsClient>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("store", &"<ConfigStore>")
            .field("sheets_client", &self.sheets_client.is_some())
            .finish()
    }
}

impl Server {
    /// Creates a new server with the given configuration.
    ///
    /// Defaults to an in-memory config store; use
    /// [`ServerBuilder::config_store`] for production.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(MemoryConfigStore::new()),
            sheets_client: None,
        }
    }

    /// Creates a new `ServerBuilder`.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the router with all routes and middleware.
    fn create_router(&self) -> Router {
        let state = Arc::new(match &self.sheets_client {
            Some(client) => AppState::with_sheets_client(
                self.config.clone(),
                Arc::clone(&self.store),
                Arc::clone(client),
            ),
            None => AppState::new(self.config.clone(), Arc::clone(&self.store)),
        });

        let cors = self.build_cors_layer();

        let context_layer = middleware::from_fn_with_state(
            Arc::clone(&state),
            crate::context::context_middleware,
        );
        let metrics_layer = middleware::from_fn(crate::metrics::metrics_middleware);

        Router::new()
            // Health, ready, metrics, and spec endpoints
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(crate::metrics::serve_metrics))
            .route("/openapi.json", get(openapi_json))
            // API routes
            .nest("/api/v1", crate::routes::api_v1_routes().layer(context_layer))
            // Middleware (order matters): metrics outermost for timing, then
            // trace, then CORS.
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer)
            .with_state(state)
    }

    /// Builds the CORS layer from configuration.
    fn build_cors_layer(&self) -> CorsLayer {
        let cors_config = &self.config.cors;
        let cors = Self::build_cors_base(cors_config);
        Self::apply_cors_allowed_origins(cors, cors_config)
    }

    fn build_cors_base(cors_config: &CorsConfig) -> CorsLayer {
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("idempotency-key"),
                header::HeaderName::from_static("x-request-id"),
            ])
            .expose_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::RETRY_AFTER,
                header::HeaderName::from_static("x-request-id"),
            ])
            .max_age(Duration::from_secs(cors_config.max_age_seconds))
    }

    fn cors_allows_any_origin(cors_config: &CorsConfig) -> bool {
        cors_config.allowed_origins.len() == 1
            && cors_config
                .allowed_origins
                .first()
                .is_some_and(|origin| origin == "*")
    }

    fn parse_cors_origins(cors_config: &CorsConfig) -> Vec<HeaderValue> {
        let mut allowed = Vec::new();
        for origin in &cors_config.allowed_origins {
            match HeaderValue::from_str(origin) {
                Ok(value) => allowed.push(value),
                Err(_) => {
                    tracing::error!(
                        origin = %origin,
                        "Invalid CORS origin; expected a valid HeaderValue"
                    );
                }
            }
        }
        allowed
    }

    fn apply_cors_allowed_origins(cors: CorsLayer, cors_config: &CorsConfig) -> CorsLayer {
        if cors_config.allowed_origins.is_empty() {
            return cors;
        }

        if Self::cors_allows_any_origin(cors_config) {
            return cors.allow_origin(Any);
        }

        if cors_config
            .allowed_origins
            .iter()
            .any(|origin| origin == "*")
        {
            tracing::error!(
                origins = ?cors_config.allowed_origins,
                "Invalid CORS config: '*' must be the only allowed origin"
            );
            return cors;
        }

        let allowed = Self::parse_cors_origins(cors_config);

        if allowed.is_empty() {
            tracing::warn!("All configured CORS origins were invalid; disabling CORS");
            cors
        } else {
            tracing::info!(origins = ?cors_config.allowed_origins, "CORS configured");
            cors.allow_origin(AllowOrigin::list(allowed))
        }
    }

    /// Starts the server and blocks until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server cannot
    /// bind to the port.
    pub async fn serve(&self) -> Result<()> {
        self.validate_config()?;

        // Initialize metrics before starting the server
        crate::metrics::init_metrics();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = self.create_router();

        tracing::info!(http_port = self.config.http_port, "Starting Tally API server");

        let listener =
            tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| tally_core::Error::Internal {
                    message: format!("failed to bind to {addr}: {e}"),
                })?;

        axum::serve(listener, router)
            .await
            .map_err(|e| tally_core::Error::Internal {
                message: format!("server error: {e}"),
            })?;

        Ok(())
    }

    /// Creates a test router for the server.
    ///
    /// This is useful for integration tests where you want to exercise the
    /// routes without actually binding to a port.
    #[doc(hidden)]
    #[must_use]
    pub fn test_router(&self) -> Router {
        self.create_router()
    }

    fn validate_config(&self) -> Result<()> {
        // Enforce "no wildcard in production" for CORS.
        if !self.config.debug
            && self
                .config
                .cors
                .allowed_origins
                .iter()
                .any(|origin| origin == "*")
        {
            return Err(tally_core::Error::InvalidInput(
                "cors.allowed_origins cannot include '*' when debug=false".to_string(),
            ));
        }

        if !self.config.debug && self.config.config_store_path.is_none() {
            return Err(tally_core::Error::InvalidInput(
                "TALLY_CONFIG_STORE_PATH is required when TALLY_DEBUG=false".to_string(),
            ));
        }

        self.config.sheets.validate(self.config.debug)
    }
}

/// Builder for constructing a server.
pub struct ServerBuilder {
    config: Config,
    store: Arc<dyn ConfigStore>,
    sheets_client: Option<Arc<dyn SheetsClient>>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("store", &"<ConfigStore>")
            .field("sheets_client", &self.sheets_client.is_some())
            .finish()
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            store: Arc::new(MemoryConfigStore::new()),
            sheets_client: None,
        }
    }
}

impl ServerBuilder {
    /// Creates a new server builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the HTTP port.
    #[must_use]
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    /// Enables debug mode.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Sets the sheet configuration store.
    ///
    /// By default, the server uses an in-memory store intended only for
    /// tests/dev.
    #[must_use]
    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets an explicit Sheets client (tests/mocks).
    #[must_use]
    pub fn sheets_client(mut self, client: Arc<dyn SheetsClient>) -> Self {
        self.sheets_client = Some(client);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config,
            store: self.store,
            sheets_client: self.sheets_client,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() -> Result<()> {
        let server = ServerBuilder::new().debug(true).build();
        let router = server.test_router();

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .context("build request")?;

        let response = router.oneshot(request).await.expect("router oneshot is infallible");

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        let health: HealthResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert_eq!(health.status, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_ready_endpoint() -> Result<()> {
        let server = ServerBuilder::new().debug(true).build();
        let router = server.test_router();

        let request = Request::builder()
            .uri("/ready")
            .body(Body::empty())
            .context("build request")?;

        let response = router.oneshot(request).await.expect("router oneshot is infallible");

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        let ready: ReadyResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert!(ready.ready);
        Ok(())
    }

    #[tokio::test]
    async fn test_openapi_endpoint() -> Result<()> {
        let server = ServerBuilder::new().debug(true).build();
        let router = server.test_router();

        let request = Request::builder()
            .uri("/openapi.json")
            .body(Body::empty())
            .context("build request")?;

        let response = router.oneshot(request).await.expect("router oneshot is infallible");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .context("read response body")?;
        let text = String::from_utf8(body.to_vec()).context("decode response body")?;
        assert!(text.contains("Tally API"));
        Ok(())
    }

    #[test]
    fn test_validate_config_rejects_wildcard_cors_in_prod() {
        let config = Config {
            debug: false,
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
                max_age_seconds: 3600,
            },
            ..Config::default()
        };
        let server = Server::new(config);
        assert!(server.validate_config().is_err());
    }

    #[test]
    fn test_validate_config_requires_store_path_in_prod() {
        let config = Config {
            debug: false,
            ..Config::default()
        };
        let server = Server::new(config);
        assert!(server.validate_config().is_err());
    }
}
