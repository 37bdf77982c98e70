use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use futures_util::future::join_all;
use prediction_core::stats::mean;
use prediction_core::{
    format_timestamp, next_trading_day, Bar, Direction, FetchError, HistoricalSeriesProvider,
    PerformanceStats, PredictionSet, PredictionStrategy, SymbolPrediction,
};
use prediction_engine::fallback_prediction;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::PredictionCache;

pub const DEFAULT_UNIVERSE: [&str; 5] = ["AAPL", "MSFT", "NVDA", "GOOGL", "AMZN"];

/// Accuracy reported while nothing has been computed yet.
pub const DEFAULT_ACCURACY: f64 = 0.75;

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Symbols predicted on every refresh, in processing order.
    pub universe: Vec<String>,
    /// A computed set older than this is recomputed on the next read.
    pub max_age: Duration,
    /// Bound on each outbound history fetch.
    pub fetch_timeout: std::time::Duration,
    /// Extra attempts after a failed or timed-out fetch.
    pub fetch_retries: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
            max_age: Duration::hours(6),
            fetch_timeout: std::time::Duration::from_secs(10),
            fetch_retries: 1,
        }
    }
}

/// Why a cached set must be recomputed.
#[derive(Debug, Clone, PartialEq)]
pub enum StaleReason {
    NeverComputed,
    NoPredictions,
    UnparseableTimestamp(String),
    Expired { age: Duration },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NeverComputed => write!(f, "never computed"),
            StaleReason::NoPredictions => write!(f, "no predictions cached"),
            StaleReason::UnparseableTimestamp(raw) => {
                write!(f, "unparseable last_updated '{}'", raw)
            }
            StaleReason::Expired { age } => write!(f, "cache is {} minutes old", age.num_minutes()),
        }
    }
}

/// First failing staleness condition for `set` at `now`, or `None` if fresh.
pub fn staleness(set: &PredictionSet, now: NaiveDateTime, max_age: Duration) -> Option<StaleReason> {
    let raw = match set.last_updated.as_deref() {
        Some(raw) => raw,
        None => return Some(StaleReason::NeverComputed),
    };
    if set.predictions.is_empty() {
        return Some(StaleReason::NoPredictions);
    }
    let Some(updated_at) = set.last_updated_at() else {
        return Some(StaleReason::UnparseableTimestamp(raw.to_string()));
    };
    let age = now - updated_at;
    if age > max_age {
        return Some(StaleReason::Expired { age });
    }
    None
}

/// Where a symbol's prediction came from this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Strategy,
    Fallback,
}

/// Serves the cached `PredictionSet`, recomputing it on demand when stale.
///
/// Refreshes and single-symbol upserts are serialised per instance, so
/// concurrent stale reads collapse into one recomputation.
pub struct CacheRefreshCoordinator {
    cache: PredictionCache,
    provider: Arc<dyn HistoricalSeriesProvider>,
    strategy: Arc<dyn PredictionStrategy>,
    config: RefreshConfig,
    refresh_lock: Mutex<()>,
}

impl CacheRefreshCoordinator {
    pub fn new(
        cache: PredictionCache,
        provider: Arc<dyn HistoricalSeriesProvider>,
        strategy: Arc<dyn PredictionStrategy>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            cache,
            provider,
            strategy,
            config,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    pub fn universe(&self) -> &[String] {
        &self.config.universe
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Cached predictions, recomputed first if the cache is stale.
    pub async fn get_predictions(&self) -> PredictionSet {
        let current = self.cache.read();
        let Some(reason) = self.stale_reason(&current) else {
            return current;
        };

        let _guard = self.refresh_lock.lock().await;

        // Another request may have finished a refresh while we waited
        let current = self.cache.read();
        if self.stale_reason(&current).is_none() {
            tracing::debug!("cache refreshed by a concurrent request");
            return current;
        }

        tracing::info!(reason = %reason, "prediction cache stale, refreshing");
        let set = self.recompute().await;
        self.cache.write(&set);
        set
    }

    /// Recompute and persist regardless of staleness.
    pub async fn refresh_now(&self) -> PredictionSet {
        let _guard = self.refresh_lock.lock().await;
        tracing::info!("forced prediction refresh");
        let set = self.recompute().await;
        self.cache.write(&set);
        set
    }

    /// How much longer `set` stays fresh, or `None` once it is stale.
    pub fn time_to_live(&self, set: &PredictionSet) -> Option<Duration> {
        let now = Utc::now().naive_utc();
        if staleness(set, now, self.config.max_age).is_some() {
            return None;
        }
        let age = now - set.last_updated_at()?;
        Some((self.config.max_age - age).min(self.config.max_age))
    }

    /// Performance summary of the persisted set, without triggering a refresh.
    /// Before the first computation this is the default accuracy over the
    /// configured universe.
    pub fn performance_stats(&self) -> PerformanceStats {
        let set = self.cache.read();
        if set.is_never_computed() {
            return PerformanceStats {
                accuracy: DEFAULT_ACCURACY,
                total_predictions: self.config.universe.len(),
            };
        }
        set.performance
    }

    /// Insert or replace one symbol's prediction via read-modify-write.
    pub async fn upsert_symbol_prediction(&self, symbol: &str, prediction: SymbolPrediction) {
        let _guard = self.refresh_lock.lock().await;
        let mut set = self.cache.read();
        set.predictions.insert(symbol.to_string(), prediction);
        self.cache.write(&set);
    }

    fn stale_reason(&self, set: &PredictionSet) -> Option<StaleReason> {
        staleness(set, Utc::now().naive_utc(), self.config.max_age)
    }

    async fn recompute(&self) -> PredictionSet {
        let to = Utc::now();
        let from = to - Duration::days(self.strategy.lookback_days());

        let outcomes = join_all(
            self.config
                .universe
                .iter()
                .map(|symbol| self.predict_symbol(symbol, from, to)),
        )
        .await;

        let mut predictions = BTreeMap::new();
        let mut computed_accuracy = Vec::new();
        let mut fallback_accuracy = Vec::new();

        for (symbol, (prediction, source)) in self.config.universe.iter().zip(outcomes) {
            if prediction.direction != Direction::Error {
                match source {
                    Source::Strategy => computed_accuracy.push(prediction.accuracy),
                    Source::Fallback => fallback_accuracy.push(prediction.accuracy),
                }
            }
            predictions.insert(symbol.clone(), prediction);
        }

        let accuracy = if computed_accuracy.is_empty() {
            mean(&fallback_accuracy)
        } else {
            mean(&computed_accuracy)
        };

        tracing::info!(
            computed = computed_accuracy.len(),
            fallback = fallback_accuracy.len(),
            accuracy,
            "prediction refresh complete"
        );

        let completed = Utc::now().naive_utc();
        PredictionSet {
            last_updated: Some(format_timestamp(completed)),
            prediction_date: next_trading_day(completed),
            performance: PerformanceStats {
                accuracy,
                total_predictions: predictions.len(),
            },
            predictions,
        }
    }

    async fn predict_symbol(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> (SymbolPrediction, Source) {
        let reason = match self.fetch_with_retry(symbol, from, to).await {
            Ok(bars) if !bars.is_empty() => match self.evaluate(bars).await {
                Ok(prediction) => {
                    tracing::info!(
                        symbol = %symbol,
                        source = self.strategy.name(),
                        direction = %prediction.direction,
                        confidence = prediction.confidence,
                        "computed prediction"
                    );
                    return (prediction, Source::Strategy);
                }
                Err(reason) => reason,
            },
            Ok(_) => "no bars returned".to_string(),
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            symbol = %symbol,
            source = "fallback",
            reason = %reason,
            "serving fallback prediction"
        );
        (fallback_prediction(), Source::Fallback)
    }

    async fn evaluate(&self, bars: Vec<Bar>) -> Result<SymbolPrediction, String> {
        let strategy = Arc::clone(&self.strategy);
        match tokio::task::spawn_blocking(move || strategy.evaluate(&bars)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("strategy task failed: {e}")),
        }
    }

    async fn fetch_with_retry(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError> {
        let attempts = self.config.fetch_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let fetch = self.provider.fetch_daily_bars(symbol, from, to);
            let error = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
                Ok(Ok(bars)) => return Ok(bars),
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout,
            };

            if matches!(error, FetchError::Auth(_)) {
                return Err(error);
            }
            if attempt < attempts {
                tracing::debug!(symbol = %symbol, attempt, error = %error, "retrying history fetch");
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(FetchError::Timeout))
    }
}
