use anyhow::{anyhow, Context};
use finnhub_client::{FinnhubConfig, DEFAULT_BASE_URL};
use prediction_cache::RefreshConfig;
use prediction_engine::StrategyKind;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub finnhub: FinnhubConfig,
    pub cache_file: PathBuf,
    pub strategy: StrategyKind,
    pub refresh: RefreshConfig,
    pub enable_hsts: bool,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset and blank values take
    /// the default; malformed numbers are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let api_key = vars
            .get("FINNHUB_API_KEY")
            .ok_or_else(|| anyhow!("FINNHUB_API_KEY must be set"))?;

        let mut finnhub = FinnhubConfig::new(api_key);
        finnhub.base_url = vars.str_or("FINNHUB_BASE_URL", DEFAULT_BASE_URL);
        finnhub.rate_limit_per_minute = vars.parse_or("FINNHUB_RATE_LIMIT", 60)?;

        let default_cache = if vars.get("VERCEL").is_some() {
            "/tmp/cache.json"
        } else {
            "cache.json"
        };

        let strategy = match vars.get("PREDICTION_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => StrategyKind::default(),
        };

        let mut refresh = RefreshConfig::default();
        if let Some(raw) = vars.get("PREDICTION_SYMBOLS") {
            refresh.universe = parse_symbols(&raw);
            if refresh.universe.is_empty() {
                return Err(anyhow!("PREDICTION_SYMBOLS must name at least one symbol"));
            }
        }
        refresh.max_age = chrono::Duration::hours(vars.parse_or("CACHE_MAX_AGE_HOURS", 6)?);
        let fetch_timeout = Duration::from_secs(vars.parse_or("FETCH_TIMEOUT_SECS", 10)?);
        refresh.fetch_timeout = fetch_timeout;
        refresh.fetch_retries = vars.parse_or("FETCH_RETRIES", 1)?;
        let finnhub = finnhub.with_timeout(fetch_timeout);

        Ok(Self {
            bind_addr: vars.str_or("BIND_ADDR", "0.0.0.0"),
            port: vars.parse_or("PORT", 5000)?,
            finnhub,
            cache_file: PathBuf::from(vars.str_or("CACHE_FILE", default_cache)),
            strategy,
            refresh,
            enable_hsts: vars.flag("ENABLE_HSTS"),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Upper-cased, de-duplicated symbols from a comma list, in order.
fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn str_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> anyhow::Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid value for {name}: '{raw}'")),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }
}
