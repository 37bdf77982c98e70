use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Bar, CompanyProfile, FetchError, PredictionError, Quote, Resolution, SymbolMatch,
    SymbolPrediction,
};

/// Source of daily history used by the prediction refresh
#[async_trait]
pub trait HistoricalSeriesProvider: Send + Sync {
    /// Daily bars in `[from, to]`, ascending by timestamp.
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError>;
}

/// Ad-hoc market snapshots served to the dashboard
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError>;

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError>;

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, FetchError>;

    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, FetchError>;
}

/// Maps one symbol's history to a directional prediction.
pub trait PredictionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Calendar days of history the strategy wants.
    fn lookback_days(&self) -> i64;

    fn evaluate(&self, bars: &[Bar]) -> Result<SymbolPrediction, PredictionError>;
}
