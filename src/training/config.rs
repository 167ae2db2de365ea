//! Training configuration

use super::random_forest::MaxFeatures;
use crate::error::{ChurnError, Result};
use crate::preprocessing::ExplicitSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Type of model to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// L2-regularized logistic regression
    LogisticRegression,
    /// Bagged CART ensemble
    RandomForest,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::LogisticRegression => "logistic_regression",
            ModelType::RandomForest => "random_forest",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class sample weighting for the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every record weighs 1
    Uniform,
    /// Weight `n / (2 * count_c)` for class `c`
    #[default]
    Balanced,
}

/// Hyperparameters of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierConfig {
    LogisticRegression {
        /// L2 regularization strength
        alpha: f64,
        learning_rate: f64,
        max_iter: usize,
        /// Gradient-norm stopping threshold
        tol: f64,
    },
    RandomForest {
        n_estimators: usize,
        max_depth: Option<usize>,
        min_samples_split: usize,
        min_samples_leaf: usize,
        max_features: MaxFeatures,
        class_weight: ClassWeight,
    },
}

impl ClassifierConfig {
    /// Logistic regression with default hyperparameters
    pub fn logistic() -> Self {
        ClassifierConfig::LogisticRegression {
            alpha: 0.01,
            learning_rate: 0.1,
            max_iter: 1000,
            tol: 1e-6,
        }
    }

    /// Random forest with default hyperparameters and balanced class weights
    pub fn random_forest() -> Self {
        ClassifierConfig::RandomForest {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            ClassifierConfig::LogisticRegression { .. } => ModelType::LogisticRegression,
            ClassifierConfig::RandomForest { .. } => ModelType::RandomForest,
        }
    }

    /// Reject hyperparameters no model can train with
    pub fn validate(&self) -> Result<()> {
        match *self {
            ClassifierConfig::LogisticRegression {
                alpha,
                learning_rate,
                max_iter,
                tol,
            } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(ChurnError::range("alpha", alpha, "must be finite and non-negative"));
                }
                if !(learning_rate.is_finite() && learning_rate > 0.0) {
                    return Err(ChurnError::range("learning_rate", learning_rate, "must be positive"));
                }
                if max_iter == 0 {
                    return Err(ChurnError::range("max_iter", max_iter, "must be positive"));
                }
                if !(tol.is_finite() && tol >= 0.0) {
                    return Err(ChurnError::range("tol", tol, "must be finite and non-negative"));
                }
            }
            ClassifierConfig::RandomForest {
                n_estimators,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                max_features,
                ..
            } => {
                if n_estimators == 0 {
                    return Err(ChurnError::range("n_estimators", n_estimators, "must be positive"));
                }
                if max_depth == Some(0) {
                    return Err(ChurnError::range("max_depth", 0, "must be positive"));
                }
                if min_samples_split < 2 {
                    return Err(ChurnError::range("min_samples_split", min_samples_split, "must be at least 2"));
                }
                if min_samples_leaf == 0 {
                    return Err(ChurnError::range("min_samples_leaf", min_samples_leaf, "must be positive"));
                }
                max_features.validate()?;
            }
        }
        Ok(())
    }
}

/// Configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Binary churn target
    pub target_field: String,

    /// Customer identifier, never a feature
    pub id_field: String,

    /// Further fields left out of the feature set
    pub exclude_fields: Vec<String>,

    /// Declared field groups; inferred from the data when absent
    pub explicit_schema: Option<ExplicitSchema>,

    /// Fraction of records held out for evaluation
    pub test_size: f64,

    /// Seed for the split and every model
    pub random_state: u64,

    /// Number of ranked features to report
    pub top_n: usize,

    /// Models trained on the same split
    pub models: Vec<ClassifierConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_field: "Churn".to_string(),
            id_field: "customerID".to_string(),
            exclude_fields: Vec::new(),
            explicit_schema: None,
            test_size: 0.3,
            random_state: 42,
            top_n: 10,
            models: vec![ClassifierConfig::logistic(), ClassifierConfig::random_forest()],
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a (possibly partial) configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_target(mut self, field: impl Into<String>) -> Self {
        self.target_field = field.into();
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_excluded(mut self, field: impl Into<String>) -> Self {
        self.exclude_fields.push(field.into());
        self
    }

    pub fn with_explicit_schema(mut self, schema: ExplicitSchema) -> Self {
        self.explicit_schema = Some(schema);
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_models(mut self, models: Vec<ClassifierConfig>) -> Self {
        self.models = models;
        self
    }

    /// Keep only the models of one type
    pub fn only(mut self, model_type: ModelType) -> Self {
        self.models.retain(|m| m.model_type() == model_type);
        if self.models.is_empty() {
            self.models.push(match model_type {
                ModelType::LogisticRegression => ClassifierConfig::logistic(),
                ModelType::RandomForest => ClassifierConfig::random_forest(),
            });
        }
        self
    }

    /// Fields excluded from the feature schema: identifier, target, extras
    pub fn excluded_fields(&self) -> Vec<String> {
        let mut fields = vec![self.id_field.clone(), self.target_field.clone()];
        for f in &self.exclude_fields {
            if !fields.contains(f) {
                fields.push(f.clone());
            }
        }
        fields
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ChurnError::range("test_size", self.test_size, "must be inside (0, 1)"));
        }
        if self.top_n == 0 {
            return Err(ChurnError::range("top_n", 0, "must be positive"));
        }
        if self.models.is_empty() {
            return Err(ChurnError::range("models", 0, "at least one model is required"));
        }
        if self.target_field == self.id_field {
            return Err(ChurnError::SchemaError(format!(
                "target and identifier are both '{}'",
                self.target_field
            )));
        }
        self.models.iter().try_for_each(ClassifierConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.target_field, "Churn");
        assert_eq!(config.id_field, "customerID");
        assert_eq!(config.test_size, 0.3);
        assert_eq!(config.random_state, 42);
        assert_eq!(config.models.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "test_size": 0.25,
            "models": [{"type": "random_forest", "n_estimators": 20, "max_depth": 6,
                        "min_samples_split": 2, "min_samples_leaf": 1,
                        "max_features": "sqrt", "class_weight": "uniform"}]
        }"#;
        let config: TrainingConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.test_size, 0.25);
        assert_eq!(config.target_field, "Churn");
        assert_eq!(config.models[0].model_type(), ModelType::RandomForest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_only_filters_models() {
        let config = TrainingConfig::default().only(ModelType::LogisticRegression);
        assert_eq!(config.models, vec![ClassifierConfig::logistic()]);
    }

    #[test]
    fn test_validation() {
        assert!(TrainingConfig::default().with_test_size(1.0).validate().is_err());
        assert!(TrainingConfig::default().with_top_n(0).validate().is_err());
        assert!(TrainingConfig::default().with_models(vec![]).validate().is_err());

        let bad_forest = ClassifierConfig::RandomForest {
            n_estimators: 0,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
        };
        assert!(matches!(
            bad_forest.validate(),
            Err(ChurnError::RangeError { .. })
        ));
    }

    #[test]
    fn test_excluded_fields() {
        let config = TrainingConfig::default().with_excluded("Churn").with_excluded("Notes");
        assert_eq!(config.excluded_fields(), vec!["customerID", "Churn", "Notes"]);
    }
}
