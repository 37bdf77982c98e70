//! Market Data API Routes
//!
//! Chart series, daily summaries, symbol search and ad-hoc symbol addition.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use futures_util::future::join_all;
use prediction_core::stats::{mean, round_to};
use prediction_core::{
    Bar, Direction, PredictionStrategy, Quote, Resolution, SymbolMatch, SymbolPrediction,
};
use prediction_engine::{fallback_prediction, HeuristicStrategy, CONFIDENCE_RANGE};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::mock_data::{mock_intraday, seeded_base_price, PricePoint};
use crate::{AppError, AppState};

/// Chart resolutions tried in order; the first non-empty series wins.
const CHART_TIERS: [Resolution; 4] = [
    Resolution::FiveMinute,
    Resolution::Hourly,
    Resolution::Daily,
    Resolution::Weekly,
];

const MAX_SEARCH_RESULTS: usize = 10;
const ADD_STOCK_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Serialize)]
pub struct ChartResponse {
    pub data: Vec<PricePoint>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DailySummary {
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub percent_change: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub market_cap: String,
    pub volume: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct AddStockRequest {
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStockResponse {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    /// Estimated next price
    pub prediction: f64,
    /// Percent, one decimal
    pub confidence: f64,
    pub direction: Direction,
}

pub fn market_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stock-data/:symbol", get(get_stock_data))
        .route("/api/summary/:symbol", get(get_daily_summary))
        .route("/api/search/:query", get(search_stocks))
        .route("/api/add-stock", post(add_stock))
}

async fn get_stock_data(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<ChartResponse> {
    let symbol = symbol.trim().to_uppercase();
    let now = Utc::now();

    for resolution in CHART_TIERS {
        let from = now - resolution.chart_lookback();
        match state.market.fetch_candles(&symbol, resolution, from, now).await {
            Ok(bars) if !bars.is_empty() => {
                tracing::debug!(symbol = %symbol, points = bars.len(), kind = resolution.label(), "chart data");
                return Json(ChartResponse {
                    data: bars.iter().map(to_point).collect(),
                    kind: resolution.label(),
                });
            }
            Ok(_) => {
                tracing::debug!(symbol = %symbol, kind = resolution.label(), "no chart data, trying next resolution")
            }
            Err(e) => {
                tracing::debug!(symbol = %symbol, kind = resolution.label(), error = %e, "chart fetch failed, trying next resolution")
            }
        }
    }

    let base_price = match state.market.fetch_quote(&symbol).await {
        Ok(quote) if quote.current > 0.0 => quote.current,
        _ => seeded_base_price(&symbol),
    };
    tracing::info!(symbol = %symbol, base_price, "no chart data upstream, serving mock intraday series");

    Json(ChartResponse {
        data: mock_intraday(&symbol, base_price, now),
        kind: "mock-intraday",
    })
}

fn to_point(bar: &Bar) -> PricePoint {
    PricePoint {
        timestamp: bar.timestamp.timestamp_millis(),
        price: bar.close,
    }
}

async fn get_daily_summary(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<DailySummary>, AppError> {
    let symbol = symbol.trim().to_uppercase();
    let quote = state
        .market
        .fetch_quote(&symbol)
        .await
        .map_err(AppError::upstream)?;
    Ok(Json(summarize(&quote)))
}

fn summarize(quote: &Quote) -> DailySummary {
    let percent_change = (quote.open != 0.0)
        .then(|| round_to((quote.current - quote.open) / quote.open * 100.0, 2));
    DailySummary {
        open: quote.open,
        close: quote.current,
        high: quote.high,
        low: quote.low,
        percent_change,
    }
}

async fn search_stocks(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = query.trim().to_uppercase();
    if query.is_empty() {
        return Ok(Json(SearchResponse { results: Vec::new() }));
    }

    let matches = state
        .market
        .search_symbols(&query)
        .await
        .map_err(AppError::upstream)?;

    let candidates = matches
        .into_iter()
        .take(MAX_SEARCH_RESULTS)
        .filter(|m| !m.symbol.is_empty() && !m.description.is_empty());

    let results = join_all(candidates.map(|m| enrich_match(&state, m)))
        .await
        .into_iter()
        .flatten()
        .collect();

    Ok(Json(SearchResponse { results }))
}

/// Quote and profile for one hit. `None` drops the hit from the results.
async fn enrich_match(state: &AppState, hit: SymbolMatch) -> Option<SearchResult> {
    let (quote, profile) = tokio::join!(
        state.market.fetch_quote(&hit.symbol),
        state.market.fetch_profile(&hit.symbol),
    );

    let (quote, profile) = match (quote, profile) {
        (Ok(quote), Ok(profile)) => (quote, profile),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(symbol = %hit.symbol, error = %e, "skipping search result");
            return None;
        }
    };

    let change = quote.current - quote.previous_close;
    let change_percent = if quote.previous_close != 0.0 {
        change / quote.previous_close * 100.0
    } else {
        0.0
    };

    Some(SearchResult {
        symbol: hit.symbol,
        name: hit.description,
        price: round_to(quote.current, 2),
        change: round_to(change, 2),
        change_percent: round_to(change_percent, 2),
        market_cap: format_market_cap(profile.market_capitalization.unwrap_or(0.0)),
        volume: "N/A",
    })
}

/// Human-readable market cap from a value in millions.
pub fn format_market_cap(millions: f64) -> String {
    if millions >= 1_000_000.0 {
        format!("{:.1}T", millions / 1_000_000.0)
    } else if millions >= 1_000.0 {
        format!("{:.1}B", millions / 1_000.0)
    } else {
        format!("{:.0}M", millions)
    }
}

async fn add_stock(
    State(state): State<AppState>,
    Json(req): Json<AddStockRequest>,
) -> Result<Json<AddStockResponse>, AppError> {
    let symbol = req.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(AppError::bad_request("Symbol is required"));
    }

    let quote = state
        .market
        .fetch_quote(&symbol)
        .await
        .map_err(AppError::upstream)?;
    let current_price = quote.current;
    if current_price <= 0.0 {
        return Err(AppError::not_found("Stock symbol not found or invalid"));
    }

    let name = match state.market.fetch_profile(&symbol).await {
        Ok(profile) => profile.name.filter(|n| !n.is_empty()),
        Err(e) => {
            tracing::debug!(symbol = %symbol, error = %e, "profile lookup failed");
            None
        }
    }
    .unwrap_or_else(|| format!("{symbol} Corporation"));

    let now = Utc::now();
    let from = now - Duration::days(ADD_STOCK_LOOKBACK_DAYS);
    let bars = match state
        .market
        .fetch_candles(&symbol, Resolution::Daily, from, now)
        .await
    {
        Ok(bars) => bars,
        Err(e) => {
            tracing::warn!(symbol = %symbol, error = %e, "history fetch failed for new symbol");
            Vec::new()
        }
    };

    let (mut prediction, predicted_price) = match project_from_history(&bars, current_price) {
        Some(projection) => projection,
        None => {
            tracing::warn!(symbol = %symbol, source = "fallback", "serving fallback prediction");
            let drift = rand::thread_rng().gen_range(0.95..=1.05);
            (fallback_prediction(), current_price * drift)
        }
    };

    let (stored_confidence, confidence_percent) = draw_confidence(&mut rand::thread_rng());
    prediction.confidence = stored_confidence;

    state
        .coordinator
        .upsert_symbol_prediction(&symbol, prediction.clone())
        .await;

    tracing::info!(symbol = %symbol, direction = %prediction.direction, "symbol added");

    Ok(Json(AddStockResponse {
        symbol,
        name,
        current_price: round_to(current_price, 2),
        prediction: round_to(predicted_price, 2),
        confidence: confidence_percent,
        direction: prediction.direction,
    }))
}

/// One confidence draw as `(stored fraction, response percent)`, each rounded
/// from the raw value: two decimals for the cache, one for the percent.
fn draw_confidence<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    let raw = rng.gen_range(CONFIDENCE_RANGE.0..=CONFIDENCE_RANGE.1);
    (round_to(raw, 2), round_to(raw * 100.0, 1))
}

/// Heuristic prediction plus a price estimate that moves half the distance
/// between the last close and the window mean. `None` without usable history.
fn project_from_history(bars: &[Bar], current_price: f64) -> Option<(SymbolPrediction, f64)> {
    let prediction = HeuristicStrategy::new().evaluate(bars).ok()?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let last = *closes.last()?;
    let avg = mean(&closes);
    if avg == 0.0 {
        return None;
    }

    let step = 0.5 * (last - avg).abs() / avg;
    let predicted = match prediction.direction {
        Direction::Up => current_price * (1.0 + step),
        _ => current_price * (1.0 - step),
    };
    Some((prediction, predicted))
}
