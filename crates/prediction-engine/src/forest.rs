use linfa::prelude::*;
use linfa::Dataset;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use prediction_core::PredictionError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows each tree until its leaves are pure.
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            seed: 42,
        }
    }
}

/// Binary classifier: bootstrap-aggregated decision trees, majority vote.
pub struct RandomForest {
    trees: Vec<DecisionTree<f64, usize>>,
}

impl RandomForest {
    /// Fit on `records` (one row per sample) with 0/1 `targets`.
    pub fn fit(
        records: &Array2<f64>,
        targets: &Array1<usize>,
        params: &ForestParams,
    ) -> Result<Self, PredictionError> {
        let n = records.nrows();
        if n == 0 || targets.len() != n {
            return Err(PredictionError::InsufficientData {
                required: 1,
                available: n.min(targets.len()),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees.max(1));

        for _ in 0..params.n_trees.max(1) {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let dataset = Dataset::new(
                records.select(Axis(0), &sample),
                targets.select(Axis(0), &sample),
            );

            let tree: DecisionTree<f64, usize> = DecisionTree::params()
                .max_depth(params.max_depth)
                .fit(&dataset)
                .map_err(|e: linfa::Error| PredictionError::Model(e.to_string()))?;
            trees.push(tree);
        }

        Ok(Self { trees })
    }

    /// Share of trees voting class 1, per row.
    pub fn predict_proba(&self, records: &Array2<f64>) -> Vec<f64> {
        let mut votes = vec![0usize; records.nrows()];
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(records);
            for (count, &class) in votes.iter_mut().zip(predicted.iter()) {
                if class == 1 {
                    *count += 1;
                }
            }
        }
        votes
            .into_iter()
            .map(|v| v as f64 / self.trees.len() as f64)
            .collect()
    }

    /// Class 1 only on a strict majority; ties go to class 0.
    pub fn predict(&self, records: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(records)
            .into_iter()
            .map(|p| usize::from(p > 0.5))
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
