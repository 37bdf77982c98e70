use prediction_core::stats::mean;
use prediction_core::{Bar, Direction, PredictionError, PredictionStrategy, SymbolPrediction};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use technical_analysis::closes;

use crate::fallback::synthetic_scores;

/// UP when the last close is above the mean of the window, DOWN otherwise.
///
/// There is no held-out data, so confidence and accuracy are synthetic values
/// from the fixed plausibility ranges. They are drawn from an RNG seeded by
/// the series itself, so the same history always scores the same.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicStrategy;

impl HeuristicStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// `None` for an empty series.
pub fn direction_from_closes(closes: &[f64]) -> Option<Direction> {
    let last = *closes.last()?;
    if last > mean(closes) {
        Some(Direction::Up)
    } else {
        Some(Direction::Down)
    }
}

fn series_seed(closes: &[f64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for close in closes {
        close.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

impl PredictionStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn lookback_days(&self) -> i64 {
        30
    }

    fn evaluate(&self, bars: &[Bar]) -> Result<SymbolPrediction, PredictionError> {
        let closes = closes(bars);
        let direction = direction_from_closes(&closes).ok_or(PredictionError::InsufficientData {
            required: 1,
            available: 0,
        })?;

        let mut rng = StdRng::seed_from_u64(series_seed(&closes));
        let (confidence, accuracy) = synthetic_scores(&mut rng);

        Ok(SymbolPrediction {
            direction,
            confidence,
            accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000,
            })
            .collect()
    }

    /// 20 closes averaging 100 with the last at 110
    fn rising_tail() -> Vec<f64> {
        let mut closes = vec![99.5; 18];
        closes.push(99.0);
        closes.push(110.0);
        closes
    }

    #[test]
    fn test_last_above_mean_is_up() {
        let closes = rising_tail();
        assert!((mean(&closes) - 100.0).abs() < 1e-9);

        let p = HeuristicStrategy::new().evaluate(&bars_from_closes(&closes)).unwrap();
        assert_eq!(p.direction, Direction::Up);
    }

    #[test]
    fn test_last_at_or_below_mean_is_down() {
        let flat = vec![100.0; 10];
        assert_eq!(direction_from_closes(&flat), Some(Direction::Down));

        let falling = vec![105.0, 104.0, 103.0, 90.0];
        let p = HeuristicStrategy::new().evaluate(&bars_from_closes(&falling)).unwrap();
        assert_eq!(p.direction, Direction::Down);
    }

    #[test]
    fn test_scores_are_synthetic_ranges() {
        let p = HeuristicStrategy::new()
            .evaluate(&bars_from_closes(&rising_tail()))
            .unwrap();
        assert!((0.6..=0.95).contains(&p.confidence));
        assert!((0.7..=0.9).contains(&p.accuracy));
    }

    #[test]
    fn test_same_series_scores_identically() {
        let bars = bars_from_closes(&rising_tail());
        let strategy = HeuristicStrategy::new();
        assert_eq!(strategy.evaluate(&bars).unwrap(), strategy.evaluate(&bars).unwrap());
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let err = HeuristicStrategy::new().evaluate(&[]).unwrap_err();
        assert!(matches!(err, PredictionError::InsufficientData { .. }));
    }
}
