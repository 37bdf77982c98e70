use thiserror::Error;

/// Failure to obtain usable data from the upstream market-data provider.
///
/// The refresh path treats every variant the same way: no usable data for
/// this symbol this cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("No data: {0}")]
    NoData(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Insufficient data: need {required} rows, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Model error: {0}")]
    Model(String),
}

#[derive(Error, Debug)]
pub enum CacheStorageError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache persist error: {0}")]
    Persist(String),
}
