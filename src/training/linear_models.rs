//! Linear models

use super::classifier::{check_fit_input, check_width, Classifier, ModelKind};
use crate::error::{ChurnError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Logistic regression for binary classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    intercept: Option<f64>,
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Iterations run by the last fit
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            n_iter: 0,
        }
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> Option<f64> {
        self.intercept
    }

    /// Gradient steps taken by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    /// Full-batch gradient descent on the L2-penalized log loss. The
    /// intercept is not penalized.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        check_fit_input(x, y)?;
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ChurnError::range("learning_rate", self.learning_rate, "must be positive"));
        }

        let n_samples = x.nrows() as f64;
        let y = y.mapv(f64::from);

        let mut weights: Array1<f64> = Array1::zeros(x.ncols());
        let mut bias = 0.0;
        let lr = self.learning_rate;
        let alpha = self.alpha;

        let mut n_iter = 0;
        for _ in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = &predictions - &y;
            let dw = (x.t().dot(&errors) / n_samples) + (alpha * &weights);
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
            n_iter += 1;
        }

        debug!(n_iter, max_iter = self.max_iter, "Fitted logistic regression");
        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        self.n_iter = n_iter;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        Ok(self.predict_scored(x)?.0)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.n_features(), x)?;
        let (coefficients, intercept) = match (&self.coefficients, self.intercept) {
            (Some(c), Some(b)) => (c, b),
            _ => return Err(ChurnError::NotFitted),
        };

        let linear = x.dot(coefficients) + intercept;
        Ok(Self::sigmoid(&linear))
    }

    fn predict_scored(&self, x: &Array2<f64>) -> Result<(Array1<u8>, Array1<f64>)> {
        let proba = self.predict_proba(x)?;
        Ok((proba.mapv(|p| u8::from(p >= 0.5)), proba))
    }

    fn n_features(&self) -> Option<usize> {
        self.coefficients.as_ref().map(|c| c.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [-2.0, 0.1],
            [-1.5, -0.2],
            [-1.0, 0.3],
            [-0.5, 0.0],
            [0.5, 0.1],
            [1.0, -0.3],
            [1.5, 0.2],
            [2.0, 0.0],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_logistic_regression() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.score(&x, &y).unwrap(), 1.0);
        let coef = model.coefficients().unwrap();
        assert!(coef[0] > 0.0);
        assert!(coef[0].abs() > coef[1].abs());

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[7] > proba[0]);

        let (labels, scored) = model.predict_scored(&x).unwrap();
        assert_eq!(scored, proba);
        assert_eq!(labels, y);
    }

    #[test]
    fn test_no_feature_importances() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        assert!(model.feature_importances().is_none());
        assert_eq!(model.coefficients().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_early_stop_on_tolerance() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new().with_tol(10.0);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_iter(), 0);
    }

    #[test]
    fn test_not_fitted_and_shape() {
        let model = LogisticRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(ChurnError::NotFitted)
        ));

        let (x, y) = separable();
        let mut model = LogisticRegression::new().with_max_iter(50);
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0, 3.0]]),
            Err(ChurnError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_single_class_rejected() {
        let mut model = LogisticRegression::new();
        let result = model.fit(&array![[0.0], [1.0]], &array![1, 1]);
        assert!(matches!(result, Err(ChurnError::FitError(_))));
    }
}
