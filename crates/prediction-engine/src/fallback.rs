use prediction_core::stats::round_to;
use prediction_core::{Direction, SymbolPrediction};
use rand::Rng;

/// Range of the synthetic confidence reported without a held-out test set.
pub const CONFIDENCE_RANGE: (f64, f64) = (0.6, 0.95);
/// Range of the synthetic accuracy reported without a held-out test set.
pub const ACCURACY_RANGE: (f64, f64) = (0.7, 0.9);

/// Plausible `(confidence, accuracy)` pair, rounded to two decimals.
///
/// These are not statistical properties of any prediction.
pub fn synthetic_scores<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    let confidence = rng.gen_range(CONFIDENCE_RANGE.0..=CONFIDENCE_RANGE.1);
    let accuracy = rng.gen_range(ACCURACY_RANGE.0..=ACCURACY_RANGE.1);
    (round_to(confidence, 2), round_to(accuracy, 2))
}

/// Degraded prediction used when no market data is available for a symbol.
pub fn fallback_prediction() -> SymbolPrediction {
    fallback_prediction_with(&mut rand::thread_rng())
}

pub fn fallback_prediction_with<R: Rng + ?Sized>(rng: &mut R) -> SymbolPrediction {
    let direction = if rng.gen_bool(0.5) {
        Direction::Up
    } else {
        Direction::Down
    };
    let (confidence, accuracy) = synthetic_scores(rng);
    SymbolPrediction {
        direction,
        confidence,
        accuracy,
    }
}
