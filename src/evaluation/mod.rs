//! Model evaluation
//!
//! Classification reports for held-out data and importance ranking for
//! ensemble models. Both produce plain structured values; rendering is left
//! to the caller.

pub mod importance;
pub mod metrics;

pub use importance::{rank_features, RankedFeature};
pub use metrics::{evaluate, evaluate_all, roc_auc, ClassMetrics, ConfusionMatrix, EvaluationReport};
