//! Synthetic intraday series for symbols with no chart data upstream.

use chrono::{DateTime, Duration, Utc};
use prediction_core::stats::round_to;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const MOCK_POINTS: usize = 60;

/// One chart point: epoch milliseconds and price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
}

fn symbol_rng(symbol: &str) -> StdRng {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    StdRng::seed_from_u64(hasher.finish())
}

/// Base price used when no live quote is available.
pub fn seeded_base_price(symbol: &str) -> f64 {
    symbol_rng(symbol).gen_range(50.0..500.0)
}

/// 60 one-minute points ending at `now`, drifting by a per-symbol trend with
/// bounded noise. Prices stay within 20% of `base_price`.
pub fn mock_intraday(symbol: &str, base_price: f64, now: DateTime<Utc>) -> Vec<PricePoint> {
    let mut rng = symbol_rng(symbol);
    // Skip the draw that produced the seeded base price
    let _: f64 = rng.gen_range(50.0..500.0);
    let trend = rng.gen_range(-0.03..0.03);
    let volatility = rng.gen_range(0.005..0.02);

    let end = now.timestamp();
    (0..MOCK_POINTS)
        .map(|i| {
            let time_factor = i as f64 / MOCK_POINTS as f64;
            let noise = base_price * volatility * rng.gen_range(-1.0..1.0);
            let price = (base_price + base_price * trend * time_factor + noise)
                .clamp(base_price * 0.8, base_price * 1.2);
            let ts = end - Duration::minutes((MOCK_POINTS - i) as i64).num_seconds();
            PricePoint {
                timestamp: ts * 1000,
                price: round_to(price, 2),
            }
        })
        .collect()
}
