//! Classification metrics

use crate::error::{ChurnError, Result};
use crate::training::Classifier;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 2x2 confusion counts; label 1 is churned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Count paired labels; both arrays must hold only 0 and 1
    pub fn from_labels(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<Self> {
        if y_pred.len() != y_true.len() {
            return Err(ChurnError::shape(
                format!("{} predictions", y_true.len()),
                format!("{} predictions", y_pred.len()),
            ));
        }
        check_binary(y_true)?;
        check_binary(y_pred)?;

        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// Rows are actual class, columns predicted class
    pub fn as_array(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

/// Precision, recall and F1 for one class (or an average over classes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

/// First label outside {0, 1} is an [`ChurnError::InvalidLabel`]
fn check_binary(labels: &Array1<u8>) -> Result<()> {
    match labels.iter().enumerate().find(|&(_, &l)| l > 1) {
        Some((row, label)) => Err(ChurnError::InvalidLabel {
            row,
            value: label.to_string(),
        }),
        None => Ok(()),
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Evaluation of one model on one test set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model: String,
    pub accuracy: f64,
    /// Indexed by class label: `[retained, churned]`
    pub per_class: [ClassMetrics; 2],
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
    /// `None` when the test set holds a single class
    pub roc_auc: Option<f64>,
}

impl EvaluationReport {
    /// Build a report from labels and optional churn scores
    pub fn from_predictions(
        model: impl Into<String>,
        y_true: &Array1<u8>,
        y_pred: &Array1<u8>,
        y_score: Option<&Array1<f64>>,
    ) -> Result<Self> {
        if y_true.is_empty() {
            return Err(ChurnError::InsufficientDataError("empty test set".to_string()));
        }
        if let Some(scores) = y_score {
            if scores.len() != y_true.len() {
                return Err(ChurnError::shape(
                    format!("{} scores", y_true.len()),
                    format!("{} scores", scores.len()),
                ));
            }
        }

        let confusion = ConfusionMatrix::from_labels(y_true, y_pred)?;
        let negative = ClassMetrics::from_counts(confusion.tn, confusion.fn_, confusion.fp);
        let positive = ClassMetrics::from_counts(confusion.tp, confusion.fp, confusion.fn_);
        let per_class = [negative, positive];

        let total = confusion.total();
        let macro_avg = ClassMetrics {
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1: (negative.f1 + positive.f1) / 2.0,
            support: total,
        };
        let weight = |m: &ClassMetrics| m.support as f64 / total as f64;
        let weighted_avg = ClassMetrics {
            precision: per_class.iter().map(|m| m.precision * weight(m)).sum(),
            recall: per_class.iter().map(|m| m.recall * weight(m)).sum(),
            f1: per_class.iter().map(|m| m.f1 * weight(m)).sum(),
            support: total,
        };

        Ok(Self {
            model: model.into(),
            accuracy: ratio(confusion.tp + confusion.tn, total),
            per_class,
            macro_avg,
            weighted_avg,
            confusion,
            roc_auc: y_score.and_then(|s| roc_auc(y_true, s)),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.confusion.total()
    }
}

/// Evaluate a fitted model on a held-out set.
///
/// `y` must hold only 0 and 1. Labels and churn probabilities come from one
/// scoring pass over `x`.
pub fn evaluate(model: &dyn Classifier, x: &Array2<f64>, y: &Array1<u8>) -> Result<EvaluationReport> {
    if y.is_empty() {
        return Err(ChurnError::InsufficientDataError("empty test set".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(ChurnError::shape(
            format!("{} rows", y.len()),
            format!("{} rows", x.nrows()),
        ));
    }
    check_binary(y)?;

    let (y_pred, y_score) = model.predict_scored(x)?;
    let report = EvaluationReport::from_predictions(model.name(), y, &y_pred, Some(&y_score))?;

    debug!(
        model = model.name(),
        accuracy = report.accuracy,
        roc_auc = ?report.roc_auc,
        "Evaluated model"
    );
    Ok(report)
}

/// Evaluate several models on the same split in parallel; results keep
/// input order
pub fn evaluate_all(models: &[&dyn Classifier], x: &Array2<f64>, y: &Array1<u8>) -> Result<Vec<EvaluationReport>> {
    models
        .par_iter()
        .map(|model| evaluate(*model, x, y))
        .collect()
}

/// Rank-based ROC AUC with tied scores sharing their average rank.
///
/// `None` unless both classes are present.
pub fn roc_auc(y_true: &Array1<u8>, scores: &Array1<f64>) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&l| l == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != y_true.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based: start+1 ..= end
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| y_true[i] == 1).count();
        pos_rank_sum += avg_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
