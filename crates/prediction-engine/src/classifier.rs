use ndarray::{Array1, Array2};
use prediction_core::stats::hit_rate;
use prediction_core::{Bar, Direction, PredictionError, PredictionStrategy, SymbolPrediction};
use technical_analysis::{closes, rsi, sma};

use crate::forest::{ForestParams, RandomForest};

pub const FEATURE_NAMES: [&str; 8] = [
    "open", "high", "low", "close", "volume", "sma_5", "sma_20", "rsi_14",
];

/// Feature rows required before a model is trained.
pub const MIN_USABLE_ROWS: usize = 30;

const SMA_SHORT: usize = 5;
const SMA_LONG: usize = 20;
const RSI_PERIOD: usize = 14;
const TEST_FRACTION: f64 = 0.2;

/// First bar index at which every rolling feature is defined.
const WARMUP: usize = SMA_LONG - 1;

/// One feature row per bar from `WARMUP` onwards, in bar order.
pub fn build_features(bars: &[Bar]) -> Vec<[f64; 8]> {
    if bars.len() <= WARMUP {
        return Vec::new();
    }

    let closes = closes(bars);
    let sma_short = sma(&closes, SMA_SHORT);
    let sma_long = sma(&closes, SMA_LONG);
    let rsi = rsi(&closes, RSI_PERIOD);

    bars.iter()
        .enumerate()
        .skip(WARMUP)
        .map(|(i, bar)| {
            [
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume as f64,
                sma_short[i + 1 - SMA_SHORT],
                sma_long[i + 1 - SMA_LONG],
                rsi[i - RSI_PERIOD],
            ]
        })
        .collect()
}

/// 1 when the next bar closes higher. The final row has no label.
fn next_day_labels(bars: &[Bar]) -> Vec<usize> {
    bars.windows(2)
        .skip(WARMUP)
        .map(|w| usize::from(w[1].close > w[0].close))
        .collect()
}

/// Chronological train/test boundary: the last `ceil(n * 0.2)` rows are held out.
fn split_point(n: usize) -> usize {
    let n_test = (n as f64 * TEST_FRACTION).ceil() as usize;
    n - n_test.min(n)
}

fn to_matrix(rows: &[[f64; 8]]) -> Result<Array2<f64>, PredictionError> {
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), FEATURE_NAMES.len()), flat)
        .map_err(|e| PredictionError::Model(e.to_string()))
}

/// Tree-ensemble classifier over SMA/RSI features.
///
/// Accuracy is the hit rate on the chronologically last 20% of labelled rows;
/// confidence is the ensemble vote share for the predicted class on the most
/// recent row.
#[derive(Debug, Clone)]
pub struct ClassifierStrategy {
    params: ForestParams,
}

impl ClassifierStrategy {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }
}

impl PredictionStrategy for ClassifierStrategy {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn lookback_days(&self) -> i64 {
        365
    }

    fn evaluate(&self, bars: &[Bar]) -> Result<SymbolPrediction, PredictionError> {
        let features = build_features(bars);
        if features.len() < MIN_USABLE_ROWS {
            return Err(PredictionError::InsufficientData {
                required: MIN_USABLE_ROWS,
                available: features.len(),
            });
        }

        let labels = next_day_labels(bars);
        let (labelled, latest) = features.split_at(features.len() - 1);
        debug_assert_eq!(labelled.len(), labels.len());

        let split = split_point(labelled.len());
        let (train_x, test_x) = labelled.split_at(split);
        let (train_y, test_y) = labels.split_at(split);

        let forest = RandomForest::fit(
            &to_matrix(train_x)?,
            &Array1::from(train_y.to_vec()),
            &self.params,
        )?;

        let predicted = forest.predict(&to_matrix(test_x)?);
        let accuracy = hit_rate(&predicted, test_y);

        let up_share = forest
            .predict_proba(&to_matrix(latest)?)
            .first()
            .copied()
            .unwrap_or(0.0);
        let (direction, confidence) = if up_share > 0.5 {
            (Direction::Up, up_share)
        } else {
            (Direction::Down, 1.0 - up_share)
        };

        tracing::debug!(
            train_rows = train_x.len(),
            test_rows = test_x.len(),
            accuracy,
            "classifier evaluated"
        );

        Ok(SymbolPrediction {
            direction,
            confidence,
            accuracy,
        })
    }
}
