//! Training engine implementation

use super::classifier::{Classifier, ModelKind, TrainedModel};
use super::config::{ModelType, TrainingConfig};
use super::split::{stratified_split, Split};
use crate::data::{labels, take_rows};
use crate::error::Result;
use crate::evaluation::{evaluate_all, rank_features, EvaluationReport, RankedFeature};
use crate::pipeline::ChurnPipeline;
use crate::preprocessing::{ColumnTransformer, FeatureSchema, SchemaResolver};
use ndarray::Axis;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome for one configured model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub model_type: ModelType,
    pub report: EvaluationReport,
    /// Top features by importance; empty for linear models
    pub top_features: Vec<RankedFeature>,
    pub training_time_secs: f64,
}

/// Everything produced by [`TrainEngine::run`]
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub schema: FeatureSchema,
    pub split: Split,
    /// One entry per configured model, in config order
    pub results: Vec<ModelResult>,
    /// Fitted pipelines, aligned with `results`
    pub pipelines: Vec<ChurnPipeline>,
}

impl TrainingRun {
    /// Pipeline of the first model of the given type
    pub fn pipeline(&self, model_type: ModelType) -> Option<&ChurnPipeline> {
        self.pipelines.iter().find(|p| p.model_type() == model_type)
    }

    pub fn result(&self, model_type: ModelType) -> Option<&ModelResult> {
        self.results.iter().find(|r| r.model_type == model_type)
    }

    /// Highest test accuracy; the earlier model wins a tie
    pub fn best(&self) -> Option<(&ModelResult, &ChurnPipeline)> {
        self.results
            .iter()
            .zip(self.pipelines.iter())
            .fold(None, |best: Option<(&ModelResult, &ChurnPipeline)>, cur| match best {
                Some(b) if b.0.report.accuracy >= cur.0.report.accuracy => Some(b),
                _ => Some(cur),
            })
    }
}

/// Runs a full churn experiment on a repaired frame
#[derive(Debug, Clone)]
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Resolve the feature schema for `df` under this config
    pub fn resolve_schema(&self, df: &DataFrame) -> Result<FeatureSchema> {
        let mut resolver = SchemaResolver::new(self.config.excluded_fields());
        if let Some(explicit) = &self.config.explicit_schema {
            resolver = resolver.with_explicit(explicit.clone());
        }
        resolver.resolve(df)
    }

    /// Split, fit the transformer on the training rows only, train every
    /// configured model and evaluate them all on the held-out rows.
    pub fn run(&self, df: &DataFrame) -> Result<TrainingRun> {
        let start = Instant::now();
        self.config.validate()?;

        let schema = self.resolve_schema(df)?;
        let y = labels(df, &self.config.target_field)?;
        let split = stratified_split(&y, self.config.test_size, self.config.random_state)?;

        let train_df = take_rows(df, &split.train)?;
        let test_df = take_rows(df, &split.test)?;
        let y_train = y.select(Axis(0), &split.train);
        let y_test = y.select(Axis(0), &split.test);

        let state = ColumnTransformer::new(schema.clone()).fit(&train_df)?;
        let x_train = state.transform(&train_df)?;
        let x_test = state.transform(&test_df)?;

        info!(
            records = df.height(),
            train = split.train.len(),
            test = split.test.len(),
            features = state.n_features(),
            "Prepared training data"
        );

        let mut models = Vec::with_capacity(self.config.models.len());
        let mut timings = Vec::with_capacity(self.config.models.len());
        for model_config in &self.config.models {
            let fit_start = Instant::now();
            let mut model = TrainedModel::from_config(model_config, self.config.random_state)?;
            model.fit(&x_train, &y_train)?;
            let secs = fit_start.elapsed().as_secs_f64();

            debug!(model = model.name(), secs, "Trained model");
            models.push(model);
            timings.push(secs);
        }

        let handles: Vec<&dyn Classifier> = models.iter().map(|m| m as &dyn Classifier).collect();
        let reports = evaluate_all(&handles, &x_test, &y_test)?;

        let mut results = Vec::with_capacity(models.len());
        let mut pipelines = Vec::with_capacity(models.len());
        for ((model, report), secs) in models.into_iter().zip(reports).zip(timings) {
            let top_features = match (model.kind(), model.feature_importances()) {
                (ModelKind::Ensemble, Some(importances)) => {
                    rank_features(&importances, state.feature_names(), self.config.top_n)?
                }
                _ => Vec::new(),
            };

            info!(
                model = model.name(),
                accuracy = report.accuracy,
                churn_recall = report.per_class[1].recall,
                "Evaluated on held-out records"
            );

            results.push(ModelResult {
                model_type: model.model_type(),
                report,
                top_features,
                training_time_secs: secs,
            });
            pipelines.push(
                ChurnPipeline::new(state.clone(), model, self.config.target_field.clone())?
                    .with_id_field(self.config.id_field.clone()),
            );
        }

        info!(
            models = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training run complete"
        );

        Ok(TrainingRun {
            schema,
            split,
            results,
            pipelines,
        })
    }
}
