//! Random Forest implementation

use super::classifier::{check_fit_input, check_width, Classifier, ModelKind};
use super::config::ClassWeight;
use super::decision_tree::DecisionTree;
use crate::error::{ChurnError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    pub class_weight: ClassWeight,
    /// Base seed; tree `i` uses `random_state + i`
    pub random_state: u64,
    /// Normalized feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: Option<usize>,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    pub fn validate(&self) -> Result<()> {
        match *self {
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                Err(ChurnError::range("max_features", f, "fraction must be inside (0, 1]"))
            }
            MaxFeatures::Fixed(0) => Err(ChurnError::range("max_features", 0, "must be positive")),
            _ => Ok(()),
        }
    }

    /// Number of candidate features per split for a given width
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f) as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        n.clamp(1, n_features.max(1))
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            class_weight: ClassWeight::Balanced,
            random_state: 42,
            feature_importances: None,
            n_features: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Per-record weights for the configured class weighting
    fn sample_weights(&self, y: &Array1<u8>) -> Vec<f64> {
        match self.class_weight {
            ClassWeight::Uniform => vec![1.0; y.len()],
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let positives = y.iter().filter(|&&l| l == 1).count() as f64;
                let class_weight = [n / (2.0 * (n - positives)), n / (2.0 * positives)];
                y.iter().map(|&l| class_weight[usize::from(l)]).collect()
            }
        }
    }

    fn compute_feature_importances(&mut self, n_features: usize) {
        let mut total_importances = Array1::<f64>::zeros(n_features);
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                total_importances += imp;
            }
        }

        // Normalize
        let total = total_importances.sum();
        if total > 0.0 {
            total_importances /= total;
        }
        self.feature_importances = Some(total_importances);
    }

    /// Number of trees voting churn for each row
    fn votes(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        check_width(self.n_features, x)?;
        if self.trees.is_empty() {
            return Err(ChurnError::NotFitted);
        }

        let all_predictions: Vec<Array1<u8>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut votes = Array1::<usize>::zeros(x.nrows());
        for preds in &all_predictions {
            votes.zip_mut_with(preds, |v, &p| *v += usize::from(p));
        }
        Ok(votes)
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Ensemble
    }

    /// Fit the forest to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.n_estimators == 0 {
            return Err(ChurnError::range("n_estimators", 0, "must be positive"));
        }
        self.max_features.validate()?;

        let start = Instant::now();
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_features = self.max_features.resolve(n_features);
        let weights = self.sample_weights(y);
        let base_seed = self.random_state;

        // Build trees in parallel
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                // Bootstrap sample
                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Array1<u8> = sample_indices.iter().map(|&i| y[i]).collect();
                let w_boot: Vec<f64> = sample_indices.iter().map(|&i| weights[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_random_state(rng.gen());
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit_weighted(&x_boot, &y_boot, &w_boot)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = Some(n_features);
        self.compute_feature_importances(n_features);

        info!(
            n_trees = self.trees.len(),
            n_samples,
            n_features,
            max_features,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitted random forest"
        );
        Ok(())
    }

    /// Majority vote; an exact tie predicts 0
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        let n_trees = self.trees.len();
        Ok(self.votes(x)?.mapv(|v| u8::from(2 * v > n_trees)))
    }

    /// Fraction of trees voting 1
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let n_trees = self.trees.len() as f64;
        Ok(self.votes(x)?.mapv(|v| v as f64 / n_trees))
    }

    /// Labels and vote fractions from a single vote count
    fn predict_scored(&self, x: &Array2<f64>) -> Result<(Array1<u8>, Array1<f64>)> {
        let votes = self.votes(x)?;
        let n_trees = self.trees.len();
        Ok((
            votes.mapv(|v| u8::from(2 * v > n_trees)),
            votes.mapv(|v| v as f64 / n_trees as f64),
        ))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [0.1, 0.0],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
            [1.0, 1.1],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(15).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.n_trees(), 15);
        let accuracy = rf.score(&x, &y).unwrap();
        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
    }

    #[test]
    fn test_predict_proba_is_vote_fraction() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        let labels = rf.predict(&x).unwrap();
        for (p, l) in proba.iter().zip(labels.iter()) {
            assert!((0.0..=1.0).contains(p));
            assert!((p * 10.0 - (p * 10.0).round()).abs() < 1e-9);
            assert_eq!(*l, u8::from(*p > 0.5));
        }
    }

    #[test]
    fn test_predict_scored_single_vote() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(6).with_random_state(3);
        rf.fit(&x, &y).unwrap();

        let (labels, proba) = rf.predict_scored(&x).unwrap();
        assert_eq!(labels, rf.predict(&x).unwrap());
        assert_eq!(proba, rf.predict_proba(&x).unwrap());
        // an even split of 6 trees is a tie and predicts 0
        for (l, p) in labels.iter().zip(proba.iter()) {
            assert_eq!(*l, u8::from(*p > 0.5));
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = blobs();
        let mut a = RandomForest::new(8).with_random_state(7);
        let mut b = RandomForest::new(8).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_feature_importances_normalized() {
        let x = array![
            [1.0, 0.0],
            [2.0, 0.0],
            [3.0, 0.0],
            [4.0, 0.0],
            [5.0, 0.0],
            [6.0, 0.0],
        ];
        let y = array![0, 0, 0, 1, 1, 1];

        let mut rf = RandomForest::new(10)
            .with_max_features(MaxFeatures::All)
            .with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_balanced_weights() {
        let rf = RandomForest::new(1);
        let weights = rf.sample_weights(&array![0, 0, 0, 1]);
        assert_eq!(weights, vec![4.0 / 6.0, 4.0 / 6.0, 4.0 / 6.0, 2.0]);
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(30), 5);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(9), 4);
        assert_eq!(MaxFeatures::Fixed(50).resolve(9), 9);
        assert!(MaxFeatures::Fraction(1.5).validate().is_err());
    }

    #[test]
    fn test_errors() {
        let rf = RandomForest::new(5);
        assert!(matches!(rf.predict(&array![[0.0]]), Err(ChurnError::NotFitted)));

        let mut rf = RandomForest::new(5);
        assert!(matches!(
            rf.fit(&array![[0.0], [1.0]], &array![0, 0]),
            Err(ChurnError::FitError(_))
        ));

        let (x, y) = blobs();
        rf.fit(&x, &y).unwrap();
        assert!(matches!(
            rf.predict(&array![[0.0, 1.0, 2.0]]),
            Err(ChurnError::ShapeError { .. })
        ));
    }
}
