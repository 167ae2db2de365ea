//! Binary classifier abstraction

use super::config::{ClassifierConfig, ModelType};
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use crate::error::{ChurnError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Capability tag of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Linear,
    Ensemble,
}

/// Trait for binary churn classifiers.
///
/// Labels are `0` (retained) and `1` (churned).
pub trait Classifier: Send + Sync {
    /// Display name, e.g. `random_forest`
    fn name(&self) -> &'static str;

    fn kind(&self) -> ModelKind;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()>;

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>>;

    /// Probability of churn (class 1) per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Labels and churn probabilities together. Models whose labels derive
    /// from their scores override this to score `x` once.
    fn predict_scored(&self, x: &Array2<f64>) -> Result<(Array1<u8>, Array1<f64>)> {
        Ok((self.predict(x)?, self.predict_proba(x)?))
    }

    /// Fit-time feature width, `None` before fit
    fn n_features(&self) -> Option<usize>;

    /// Accuracy on `(x, y)`
    fn score(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        if y_pred.len() != y.len() {
            return Err(ChurnError::shape(
                format!("{} labels", y_pred.len()),
                format!("{} labels", y.len()),
            ));
        }
        if y.is_empty() {
            return Err(ChurnError::InsufficientDataError("empty evaluation set".to_string()));
        }
        let correct = y_pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        Ok(correct as f64 / y.len() as f64)
    }

    /// Per-feature importances, for models that have them
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Validate training input: matching row counts, labels in {0, 1}, both
/// classes present.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ChurnError::shape(
            format!("y length = {}", x.nrows()),
            format!("y length = {}", y.len()),
        ));
    }
    if let Some((row, label)) = y.iter().enumerate().find(|&(_, &l)| l > 1) {
        return Err(ChurnError::InvalidLabel {
            row,
            value: label.to_string(),
        });
    }
    let positives = y.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == y.len() {
        return Err(ChurnError::FitError(format!(
            "need both classes to train, got {} records with {} positives",
            y.len(),
            positives
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ChurnError::FitError("feature matrix contains non-finite values".to_string()));
    }
    Ok(())
}

/// Check a predict-time matrix against the fit-time width
pub(crate) fn check_width(fitted: Option<usize>, x: &Array2<f64>) -> Result<()> {
    let expected = fitted.ok_or(ChurnError::NotFitted)?;
    if x.ncols() != expected {
        return Err(ChurnError::shape(
            format!("{} features", expected),
            format!("{} features", x.ncols()),
        ));
    }
    Ok(())
}

/// A trained model of either kind.
///
/// This is the serializable handle stored in a pipeline; it dispatches every
/// [`Classifier`] call to the wrapped model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    Linear(LogisticRegression),
    Ensemble(RandomForest),
}

impl TrainedModel {
    /// Unfitted model for a config, seeded with `random_state`
    pub fn from_config(config: &ClassifierConfig, random_state: u64) -> Result<Self> {
        config.validate()?;
        Ok(match *config {
            ClassifierConfig::LogisticRegression {
                alpha,
                learning_rate,
                max_iter,
                tol,
            } => TrainedModel::Linear(
                LogisticRegression::new()
                    .with_alpha(alpha)
                    .with_learning_rate(learning_rate)
                    .with_max_iter(max_iter)
                    .with_tol(tol),
            ),
            ClassifierConfig::RandomForest {
                n_estimators,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                max_features,
                class_weight,
            } => {
                let mut forest = RandomForest::new(n_estimators)
                    .with_min_samples_split(min_samples_split)
                    .with_min_samples_leaf(min_samples_leaf)
                    .with_max_features(max_features)
                    .with_class_weight(class_weight)
                    .with_random_state(random_state);
                if let Some(depth) = max_depth {
                    forest = forest.with_max_depth(depth);
                }
                TrainedModel::Ensemble(forest)
            }
        })
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            TrainedModel::Linear(_) => ModelType::LogisticRegression,
            TrainedModel::Ensemble(_) => ModelType::RandomForest,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedModel::Linear(m) => m as &dyn Classifier,
            TrainedModel::Ensemble(m) => m as &dyn Classifier,
        }
    }
}

impl Classifier for TrainedModel {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn kind(&self) -> ModelKind {
        self.inner().kind()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        match self {
            TrainedModel::Linear(m) => m.fit(x, y),
            TrainedModel::Ensemble(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_proba(x)
    }

    fn predict_scored(&self, x: &Array2<f64>) -> Result<(Array1<u8>, Array1<f64>)> {
        self.inner().predict_scored(x)
    }

    fn n_features(&self) -> Option<usize> {
        self.inner().n_features()
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.inner().feature_importances()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_check_fit_input() {
        let x = array![[0.0], [1.0], [2.0]];
        assert!(check_fit_input(&x, &array![0, 1, 0]).is_ok());
        assert!(matches!(
            check_fit_input(&x, &array![1, 1, 1]),
            Err(ChurnError::FitError(_))
        ));
        assert!(matches!(
            check_fit_input(&x, &array![0, 1]),
            Err(ChurnError::ShapeError { .. })
        ));
        assert!(matches!(
            check_fit_input(&x, &array![0, 2, 1]),
            Err(ChurnError::InvalidLabel { row: 1, .. })
        ));
    }

    #[test]
    fn test_dispatch_from_config() {
        let linear = TrainedModel::from_config(&ClassifierConfig::logistic(), 7).unwrap();
        assert_eq!(linear.kind(), ModelKind::Linear);
        assert_eq!(linear.name(), "logistic_regression");

        let forest = TrainedModel::from_config(&ClassifierConfig::random_forest(), 7).unwrap();
        assert_eq!(forest.kind(), ModelKind::Ensemble);
        assert_eq!(forest.model_type(), ModelType::RandomForest);
        assert!(forest.n_features().is_none());
        assert!(matches!(
            forest.predict(&array![[1.0]]),
            Err(ChurnError::NotFitted)
        ));
    }

    #[test]
    fn test_scored_dispatch_matches_separate_calls() {
        let x = array![[0.0], [0.2], [0.9], [1.0], [0.1], [0.8]];
        let y = array![0, 0, 1, 1, 0, 1];
        for config in [ClassifierConfig::logistic(), ClassifierConfig::random_forest()] {
            let mut model = TrainedModel::from_config(&config, 3).unwrap();
            model.fit(&x, &y).unwrap();
            let (labels, proba) = model.predict_scored(&x).unwrap();
            assert_eq!(labels, model.predict(&x).unwrap());
            assert_eq!(proba, model.predict_proba(&x).unwrap());
        }
    }
}
