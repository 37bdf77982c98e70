use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prediction_core::{
    Bar, CompanyProfile, FetchError, HistoricalSeriesProvider, Quote, QuoteProvider, Resolution,
    SymbolMatch,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Attempts made when upstream answers 429 before giving up.
const MAX_RATE_LIMIT_ATTEMPTS: u32 = 3;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }
            let Some(&oldest) = ts.front() else {
                ts.push_back(now);
                return;
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for Finnhub API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinnhubConfig {
    pub api_key: String,
    pub base_url: String,
    /// Requests per minute. The free plan allows 60.
    pub rate_limit_per_minute: usize,
    /// Applied to every outbound request; an elapsed timeout is a `FetchError::Timeout`.
    pub timeout: Duration,
    /// Pause between attempts after a 429. Defaults to a quarter of `timeout`
    /// so the retries fit inside a caller's fetch timeout of the same length.
    pub rate_limit_backoff: Duration,
}

impl FinnhubConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_per_minute: 60,
            timeout: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_millis(2500),
        }
    }

    /// Set the request timeout and scale the 429 backoff with it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.rate_limit_backoff = timeout / 4;
        self
    }

    /// Longest total time spent sleeping on 429 responses for one request.
    pub fn max_rate_limit_wait(&self) -> Duration {
        self.rate_limit_backoff * (MAX_RATE_LIMIT_ATTEMPTS - 1)
    }
}

#[derive(Clone)]
pub struct FinnhubClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    rate_limit_backoff: Duration,
}

impl FinnhubClient {
    pub fn new(config: FinnhubConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
            rate_limit_backoff: config.rate_limit_backoff,
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, FetchError> {
        let request = builder.build().map_err(map_transport_error)?;

        for attempt in 1..=MAX_RATE_LIMIT_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| FetchError::Network("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(map_transport_error)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if attempt == MAX_RATE_LIMIT_ATTEMPTS {
                break;
            }
            tracing::warn!(
                "Finnhub 429 rate limited, waiting {:.1}s before retry {}/{}",
                self.rate_limit_backoff.as_secs_f64(),
                attempt,
                MAX_RATE_LIMIT_ATTEMPTS - 1
            );
            tokio::time::sleep(self.rate_limit_backoff).await;
        }

        Err(FetchError::RateLimited)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .send_request(
                self.client
                    .get(&url)
                    .query(query)
                    .query(&[("token", &self.api_key)]),
            )
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Auth(format!("HTTP {} for {}", status, path)));
        }
        if !status.is_success() {
            return Err(FetchError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }

    /// Get candles (bars) for a symbol at the given resolution
    pub async fn get_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError> {
        let response: CandleResponse = self
            .get_json(
                "/stock/candle",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("resolution", resolution.as_str().to_string()),
                    ("from", from.timestamp().to_string()),
                    ("to", to.timestamp().to_string()),
                ],
            )
            .await?;

        candles_to_bars(symbol, response)
    }

    /// Get the latest quote for a symbol
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let response: QuoteResponse = self
            .get_json("/quote", &[("symbol", symbol.to_uppercase())])
            .await?;
        Ok(response.into())
    }

    /// Get company profile (name, market cap)
    pub async fn get_profile(&self, symbol: &str) -> Result<CompanyProfile, FetchError> {
        let response: ProfileResponse = self
            .get_json("/stock/profile2", &[("symbol", symbol.to_uppercase())])
            .await?;
        Ok(CompanyProfile {
            name: response.name.filter(|n| !n.is_empty()),
            market_capitalization: response.market_capitalization,
        })
    }

    /// Search symbols by ticker or company name
    pub async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, FetchError> {
        let response: SearchResponse = self
            .get_json("/search", &[("q", query.to_uppercase())])
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|r| SymbolMatch {
                symbol: r.symbol,
                description: r.description,
            })
            .collect())
    }
}

#[async_trait]
impl HistoricalSeriesProvider for FinnhubClient {
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError> {
        self.get_candles(symbol, Resolution::Daily, from, to).await
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError> {
        self.get_candles(symbol, resolution, from, to).await
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        self.get_quote(symbol).await
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, FetchError> {
        self.get_profile(symbol).await
    }

    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, FetchError> {
        self.search(query).await
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Convert a candle payload into ascending, de-duplicated bars.
fn candles_to_bars(symbol: &str, r: CandleResponse) -> Result<Vec<Bar>, FetchError> {
    if r.s != "ok" || r.c.is_empty() {
        return Err(FetchError::NoData(format!("{} returned status '{}'", symbol, r.s)));
    }

    let n = r.c.len();
    if [r.t.len(), r.o.len(), r.h.len(), r.l.len(), r.v.len()]
        .iter()
        .any(|&len| len != n)
    {
        return Err(FetchError::InvalidResponse(format!(
            "{} candle arrays have mismatched lengths",
            symbol
        )));
    }

    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let timestamp = DateTime::from_timestamp(r.t[i], 0).ok_or_else(|| {
            FetchError::InvalidResponse(format!("{} has invalid timestamp {}", symbol, r.t[i]))
        })?;
        bars.push(Bar {
            timestamp,
            open: r.o[i],
            high: r.h[i],
            low: r.l[i],
            close: r.c[i],
            volume: r.v[i].max(0.0).round() as u64,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

// Response structures

#[derive(Debug, Deserialize)]
struct CandleResponse {
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    c: Option<f64>,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    pc: Option<f64>,
}

impl From<QuoteResponse> for Quote {
    fn from(r: QuoteResponse) -> Self {
        Quote {
            current: r.c.unwrap_or(0.0),
            open: r.o.unwrap_or(0.0),
            high: r.h.unwrap_or(0.0),
            low: r.l.unwrap_or(0.0),
            previous_close: r.pc.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    name: Option<String>,
    #[serde(rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    description: String,
    #[serde(default)]
    symbol: String,
}
