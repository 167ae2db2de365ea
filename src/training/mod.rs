//! Model training module
//!
//! Provides the churn classifiers and the experiment driver:
//! - Logistic regression (linear)
//! - Random forest over Gini decision trees (ensemble)
//! - Stratified train/test splitting
//! - [`TrainEngine`], which runs split, transform, fit and evaluation end to end

mod config;
mod engine;
pub mod classifier;
pub mod decision_tree;
pub mod linear_models;
pub mod random_forest;
pub mod split;

pub use classifier::{Classifier, ModelKind, TrainedModel};
pub use config::{ClassWeight, ClassifierConfig, ModelType, TrainingConfig};
pub use decision_tree::{DecisionTree, TreeNode};
pub use engine::{ModelResult, TrainEngine, TrainingRun};
pub use linear_models::LogisticRegression;
pub use random_forest::{MaxFeatures, RandomForest};
pub use split::{split_records, stratified_split, Split};
