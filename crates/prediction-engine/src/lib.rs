mod classifier;
mod fallback;
mod forest;
mod heuristic;

use prediction_core::PredictionStrategy;
use std::str::FromStr;
use std::sync::Arc;

pub use classifier::{build_features, ClassifierStrategy, FEATURE_NAMES, MIN_USABLE_ROWS};
pub use fallback::{
    fallback_prediction, fallback_prediction_with, synthetic_scores, ACCURACY_RANGE,
    CONFIDENCE_RANGE,
};
pub use forest::{ForestParams, RandomForest};
pub use heuristic::{direction_from_closes, HeuristicStrategy};

/// Which prediction strategy the refresh pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Last close vs. trailing mean over ~30 calendar days
    #[default]
    Heuristic,
    /// Bagged decision trees over a year of engineered features
    Classifier,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown prediction strategy '{0}' (expected 'heuristic' or 'classifier')")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" | "mean" => Ok(StrategyKind::Heuristic),
            "classifier" | "random-forest" | "random_forest" | "ml" => {
                Ok(StrategyKind::Classifier)
            }
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn PredictionStrategy> {
        match self {
            StrategyKind::Heuristic => Arc::new(HeuristicStrategy::new()),
            StrategyKind::Classifier => Arc::new(ClassifierStrategy::new(ForestParams::default())),
        }
    }
}
