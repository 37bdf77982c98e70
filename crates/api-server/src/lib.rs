pub mod config;
pub mod market_routes;
pub mod mock_data;
pub mod prediction_routes;
pub mod request_id;
pub mod security_headers;


use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use finnhub_client::FinnhubClient;
use prediction_cache::{CacheRefreshCoordinator, PredictionCache};
use prediction_core::QuoteProvider;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::request_id::request_id_middleware;
use crate::security_headers::{security_headers_middleware, SecurityHeaders};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<CacheRefreshCoordinator>,
    pub market: Arc<dyn QuoteProvider>,
}

impl AppState {
    /// Wire the Finnhub client, cache and configured strategy together.
    pub fn from_config(config: &ServerConfig) -> Self {
        let client = Arc::new(FinnhubClient::new(config.finnhub.clone()));
        let coordinator = CacheRefreshCoordinator::new(
            PredictionCache::new(&config.cache_file),
            client.clone(),
            config.strategy.build(),
            config.refresh.clone(),
        );
        Self {
            coordinator: Arc::new(coordinator),
            market: client,
        }
    }
}

/// Handler error rendered as `{"error": "..."}` with its status code.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!(message.into()))
    }

    /// Upstream market data failed.
    pub fn upstream(error: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::BAD_GATEWAY, error)
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.error, "request rejected");
        }
        let body = json!({ "error": self.error.to_string() });
        (self.status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState, security: SecurityHeaders) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(prediction_routes::prediction_routes())
        .merge(market_routes::market_routes())
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            security,
            security_headers_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
}

/// Install the global subscriber. `RUST_LOG_FORMAT=json` selects JSON output.
pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let state = AppState::from_config(&config);

    tracing::info!(
        strategy = state.coordinator.strategy_name(),
        symbols = ?state.coordinator.universe(),
        cache_file = %config.cache_file.display(),
        "starting prediction server"
    );

    let app = router(
        state,
        SecurityHeaders {
            enable_hsts: config.enable_hsts,
        },
    );

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
