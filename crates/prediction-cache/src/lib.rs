//! Durable single-slot prediction cache and the refresh pipeline that keeps it current.

pub mod coordinator;
pub mod store;

#[cfg(test)]
mod coordinator_tests;

pub use coordinator::{
    staleness, CacheRefreshCoordinator, RefreshConfig, StaleReason, DEFAULT_ACCURACY,
};
pub use store::PredictionCache;
