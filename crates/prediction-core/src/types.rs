use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calendar::next_trading_day;

/// Format used for `PredictionSet::last_updated` on disk and over the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Candle resolution supported by the upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    FiveMinute,
    Hourly,
    Daily,
    Weekly,
}

impl Resolution {
    /// Upstream query value
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::FiveMinute => "5",
            Resolution::Hourly => "60",
            Resolution::Daily => "D",
            Resolution::Weekly => "W",
        }
    }

    /// Label reported to chart clients
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::FiveMinute => "5min",
            Resolution::Hourly => "hourly",
            Resolution::Daily => "daily",
            Resolution::Weekly => "weekly",
        }
    }

    /// How far back a chart request reaches at this resolution
    pub fn chart_lookback(&self) -> Duration {
        match self {
            Resolution::FiveMinute => Duration::hours(24),
            Resolution::Hourly => Duration::days(7),
            Resolution::Daily => Duration::days(30),
            Resolution::Weekly => Duration::days(180),
        }
    }
}

/// Latest quote snapshot. Unknown symbols come back with a zero `current`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub current: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub previous_close: f64,
}

/// Company profile subset used by the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: Option<String>,
    /// Market capitalisation in millions of the listing currency
    pub market_capitalization: Option<f64>,
}

/// One hit from a symbol search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub description: String,
}

/// Predicted direction for the next trading day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    /// No prediction could be computed this cycle
    Error,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolPrediction {
    #[serde(alias = "prediction")]
    pub direction: Direction,
    pub confidence: f64, // 0.0 to 1.0
    pub accuracy: f64,   // 0.0 to 1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub accuracy: f64,
    pub total_predictions: usize,
}

/// The single cached snapshot of predictions for the whole universe.
///
/// `last_updated` is kept as the raw persisted string so that an unparseable
/// value is detected by the staleness check instead of failing the read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub last_updated: Option<String>,
    #[serde(default = "default_prediction_date")]
    pub prediction_date: NaiveDate,
    #[serde(default)]
    pub predictions: BTreeMap<String, SymbolPrediction>,
    #[serde(default)]
    pub performance: PerformanceStats,
}

fn default_prediction_date() -> NaiveDate {
    next_trading_day(Utc::now().naive_utc())
}

impl PredictionSet {
    /// The "never computed" set: no timestamp, no predictions.
    pub fn empty(now: NaiveDateTime) -> Self {
        Self {
            last_updated: None,
            prediction_date: next_trading_day(now),
            predictions: BTreeMap::new(),
            performance: PerformanceStats::default(),
        }
    }

    /// Parsed `last_updated`, `None` when absent or malformed.
    pub fn last_updated_at(&self) -> Option<NaiveDateTime> {
        self.last_updated
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
    }

    pub fn is_never_computed(&self) -> bool {
        self.last_updated.is_none()
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
