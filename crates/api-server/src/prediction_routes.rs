//! Prediction API Routes
//!
//! Serve the cached prediction set, refreshing it on demand when stale.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prediction_core::{PerformanceStats, PredictionSet};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub performance: PerformanceStats,
}

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/api/predict", get(get_predictions))
        .route("/api/stats", get(get_stats))
        .route("/api/refresh", post(refresh_predictions))
}

/// The served set may be reused by the client until the cache would refresh it.
async fn get_predictions(State(state): State<AppState>) -> impl IntoResponse {
    let set = state.coordinator.get_predictions().await;
    let cache_control = match state.coordinator.time_to_live(&set) {
        Some(ttl) => format!("private, max-age={}", ttl.num_seconds().max(0)),
        None => "no-cache".to_string(),
    };
    ([(header::CACHE_CONTROL, cache_control)], Json(set))
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        performance: state.coordinator.performance_stats(),
    })
}

async fn refresh_predictions(State(state): State<AppState>) -> Json<PredictionSet> {
    Json(state.coordinator.refresh_now().await)
}
