//! Fitted churn pipeline
//!
//! Bundles a [`FittedTransformState`] with a [`TrainedModel`] so raw records
//! go in and churn predictions come out. The bundle is what gets persisted:
//! reloading it reproduces every fit parameter exactly.

use crate::data::{column, has_field, labels, Record};
use crate::error::{ChurnError, Result};
use crate::evaluation::{evaluate, EvaluationReport};
use crate::preprocessing::{ColumnTransformer, FeatureSchema, FittedTransformState};
use crate::training::{Classifier, ModelType, TrainedModel};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

/// Version of the persisted layout
pub const FORMAT_VERSION: u32 = 1;

/// Column names used by [`ChurnPipeline::predictions_table`]
pub const PREDICTION_FIELD: &str = "prediction";
pub const PROBABILITY_FIELD: &str = "churn_probability";

/// Transformer state and classifier, fitted together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnPipeline {
    format_version: u32,
    target_field: String,
    id_field: Option<String>,
    state: FittedTransformState,
    model: TrainedModel,
}

impl ChurnPipeline {
    /// Combine an already fitted state and model.
    ///
    /// Fails with `NotFitted` for an untrained model and `ShapeError` when
    /// the model was trained on a different feature width.
    pub fn new(state: FittedTransformState, model: TrainedModel, target_field: impl Into<String>) -> Result<Self> {
        let width = model.n_features().ok_or(ChurnError::NotFitted)?;
        if width != state.n_features() {
            return Err(ChurnError::shape(
                format!("{} features", state.n_features()),
                format!("model trained on {} features", width),
            ));
        }
        Ok(Self {
            format_version: FORMAT_VERSION,
            target_field: target_field.into(),
            id_field: None,
            state,
            model,
        })
    }

    /// Fit transformer and model on every row of `df`
    pub fn fit(df: &DataFrame, schema: FeatureSchema, mut model: TrainedModel, target_field: &str) -> Result<Self> {
        let y = labels(df, target_field)?;
        let (state, x) = ColumnTransformer::new(schema).fit_transform(df)?;
        model.fit(&x, &y)?;
        Self::new(state, model, target_field)
    }

    /// Carry an identifier field through to prediction output
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    pub fn state(&self) -> &FittedTransformState {
        &self.state
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    pub fn feature_names(&self) -> &[String] {
        self.state.feature_names()
    }

    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        self.state.transform(df)
    }

    pub fn predict(&self, df: &DataFrame) -> Result<Array1<u8>> {
        self.model.predict(&self.transform(df)?)
    }

    pub fn predict_proba(&self, df: &DataFrame) -> Result<Array1<f64>> {
        self.model.predict_proba(&self.transform(df)?)
    }

    /// Labels and churn probabilities from one scoring pass
    pub fn predict_scored(&self, df: &DataFrame) -> Result<(Array1<u8>, Array1<f64>)> {
        self.model.predict_scored(&self.transform(df)?)
    }

    /// Label and churn probability for one record
    pub fn predict_record(&self, record: &Record) -> Result<(u8, f64)> {
        let x = self.state.transform_record(record)?.insert_axis(Axis(0));
        let (label, proba) = self.model.predict_scored(&x)?;
        Ok((label[0], proba[0]))
    }

    /// Evaluate against a labelled frame
    pub fn evaluate(&self, df: &DataFrame) -> Result<EvaluationReport> {
        let y = labels(df, &self.target_field)?;
        let x = self.transform(df)?;
        evaluate(&self.model, &x, &y)
    }

    /// Predictions as a frame: the identifier (when configured and present),
    /// then predicted label and churn probability
    pub fn predictions_table(&self, df: &DataFrame) -> Result<DataFrame> {
        let (predicted, proba) = self.predict_scored(df)?;

        let mut columns: Vec<Column> = Vec::with_capacity(3);
        if let Some(id) = self.id_field.as_deref().filter(|f| has_field(df, f)) {
            columns.push(column(df, id)?.clone().into());
        }
        let predicted: Vec<i32> = predicted.iter().map(|&l| i32::from(l)).collect();
        columns.push(Series::new(PREDICTION_FIELD.into(), predicted).into());
        columns.push(Series::new(PROBABILITY_FIELD.into(), proba.to_vec()).into());
        Ok(DataFrame::new(columns)?)
    }

    /// Serialize with bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ChurnError::SerializationError(format!("Failed to serialize: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let pipeline: Self = bincode::deserialize(bytes)
            .map_err(|e| ChurnError::SerializationError(format!("Failed to deserialize: {}", e)))?;
        if pipeline.format_version != FORMAT_VERSION {
            return Err(ChurnError::SerializationError(format!(
                "unsupported pipeline format version {} (expected {})",
                pipeline.format_version, FORMAT_VERSION
            )));
        }
        Ok(pipeline)
    }

    /// Write the pipeline to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;

        info!(
            path = %path.display(),
            model = self.model_type().as_str(),
            bytes = bytes.len(),
            "Saved pipeline"
        );
        Ok(())
    }

    /// Read a pipeline written by [`ChurnPipeline::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
        let pipeline = Self::from_bytes(&bytes)?;

        info!(
            path = %path.display(),
            model = pipeline.model_type().as_str(),
            "Loaded pipeline"
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{from_records, record};
    use crate::training::{ClassifierConfig, LogisticRegression};

    fn table() -> DataFrame {
        let rows = [
            ("a", 1.0, "Month-to-month", 1.0),
            ("b", 2.0, "Month-to-month", 1.0),
            ("c", 3.0, "Month-to-month", 1.0),
            ("d", 40.0, "Two year", 0.0),
            ("e", 50.0, "Two year", 0.0),
            ("f", 60.0, "One year", 0.0),
            ("g", 45.0, "One year", 0.0),
            ("h", 5.0, "Month-to-month", 1.0),
        ];
        from_records(rows.iter().map(|&(id, tenure, contract, churn)| {
            Record::new()
                .with("customerID", id)
                .with("tenure", tenure)
                .with("Contract", contract)
                .with("Churn", churn)
        }))
        .unwrap()
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec!["tenure".to_string()], vec!["Contract".to_string()]).unwrap()
    }

    fn fitted(config: &ClassifierConfig) -> ChurnPipeline {
        let model = TrainedModel::from_config(config, 42).unwrap();
        ChurnPipeline::fit(&table(), schema(), model, "Churn")
            .unwrap()
            .with_id_field("customerID")
    }

    #[test]
    fn test_fit_and_predict() {
        let pipeline = fitted(&ClassifierConfig::logistic());
        let preds = pipeline.predict(&table()).unwrap();
        assert_eq!(preds.to_vec(), vec![1, 1, 1, 0, 0, 0, 0, 1]);

        let report = pipeline.evaluate(&table()).unwrap();
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let pipeline = fitted(&ClassifierConfig::random_forest());
        let restored = ChurnPipeline::from_bytes(&pipeline.to_bytes().unwrap()).unwrap();

        assert_eq!(restored.state(), pipeline.state());
        assert_eq!(restored.id_field(), Some("customerID"));
        assert_eq!(
            restored.predict_proba(&table()).unwrap(),
            pipeline.predict_proba(&table()).unwrap()
        );
    }

    #[test]
    fn test_predict_record_matches_table() {
        let pipeline = fitted(&ClassifierConfig::logistic());
        let data = table();
        let proba = pipeline.predict_proba(&data).unwrap();
        let (label, p) = pipeline.predict_record(&record(&data, 3).unwrap()).unwrap();
        assert!((p - proba[3]).abs() < 1e-12);
        assert_eq!(label, 0);
    }

    #[test]
    fn test_predict_scored_agrees_with_separate_calls() {
        let pipeline = fitted(&ClassifierConfig::random_forest());
        let data = table();
        let (labels, proba) = pipeline.predict_scored(&data).unwrap();
        assert_eq!(labels, pipeline.predict(&data).unwrap());
        assert_eq!(proba, pipeline.predict_proba(&data).unwrap());
    }

    #[test]
    fn test_predictions_table_carries_id() {
        let pipeline = fitted(&ClassifierConfig::logistic());
        let out = pipeline.predictions_table(&table()).unwrap();
        assert_eq!(out.get_column_names_str(), vec!["customerID", PREDICTION_FIELD, PROBABILITY_FIELD]);
        assert_eq!(out.height(), 8);
        assert_eq!(out.column("customerID").unwrap().str().unwrap().get(0), Some("a"));

        let predicted = out.column(PREDICTION_FIELD).unwrap().i32().unwrap();
        assert_eq!(predicted.get(3), Some(0));

        let unnamed = pipeline.clone().with_id_field("accountID").predictions_table(&table()).unwrap();
        assert_eq!(unnamed.get_column_names_str(), vec![PREDICTION_FIELD, PROBABILITY_FIELD]);
    }

    #[test]
    fn test_unfitted_model_rejected() {
        let state = ColumnTransformer::new(schema()).fit(&table()).unwrap();
        let result = ChurnPipeline::new(state, TrainedModel::Linear(LogisticRegression::new()), "Churn");
        assert!(matches!(result, Err(ChurnError::NotFitted)));
    }

    #[test]
    fn test_rejects_other_format_version() {
        let mut pipeline = fitted(&ClassifierConfig::logistic());
        pipeline.format_version = FORMAT_VERSION + 1;
        let bytes = pipeline.to_bytes().unwrap();
        assert!(matches!(
            ChurnPipeline::from_bytes(&bytes),
            Err(ChurnError::SerializationError(_))
        ));
    }
}
