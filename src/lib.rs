//! Churn Pipeline - customer churn prediction from tabular account records
//!
//! This crate turns raw customer records into churn models:
//! - Ingestion and repair of raw JSON/CSV records
//! - Schema resolution and a fit-once column transformer (standardized
//!   numerics, reference-dropped one-hot categoricals)
//! - Stratified, seeded train/test splitting
//! - Logistic regression and random forest classifiers
//! - Evaluation reports and feature-importance ranking
//!
//! # Modules
//!
//! - [`data`] - Records, ingestion and repair
//! - [`preprocessing`] - Schema resolution and column transformation
//! - [`training`] - Classifiers, splitting and the training engine
//! - [`evaluation`] - Classification metrics and importance ranking
//! - [`pipeline`] - Fitted, persistable transformer + model bundle
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data and features
pub mod data;
pub mod preprocessing;

// Models
pub mod training;
pub mod evaluation;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{ChurnError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::data::{from_records, labels, record, Record, RawValue, RepairConfig};
    pub use crate::error::{ChurnError, Result};
    pub use crate::evaluation::{evaluate, rank_features, EvaluationReport, RankedFeature};
    pub use crate::pipeline::ChurnPipeline;
    pub use crate::preprocessing::{ColumnTransformer, FeatureSchema, FittedTransformState, SchemaResolver};
    pub use crate::training::{
        stratified_split, Classifier, ClassifierConfig, LogisticRegression, ModelType, RandomForest,
        TrainEngine, TrainedModel, TrainingConfig,
    };
}
