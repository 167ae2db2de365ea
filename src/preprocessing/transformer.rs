//! Column transformer
//!
//! Fits per-field state on training records and applies it to any table:
//! numeric fields are standardized, categorical fields one-hot encoded with
//! the lowest category dropped as reference.

use super::schema::{ColumnType, FeatureSchema};
use crate::data::{category_tokens, cell, column, numeric_cells, present_cells, RawValue, Record};
use crate::error::{ChurnError, Result};
use ndarray::{Array1, Array2, ArrayViewMut1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Fitted standard deviations below this are stored as 1
pub const STD_EPSILON: f64 = 1e-12;

/// Standardization parameters for one numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub field: String,
    pub mean: f64,
    /// Population std, or 1 when the observed std was below [`STD_EPSILON`]
    pub std: f64,
    pub count: usize,
}

impl NumericStats {
    /// Population statistics over the non-null cells of `values`
    fn fit(field: &str, values: &Float64Chunked) -> Result<Self> {
        let count = values.len() - values.null_count();
        let (mean, std) = match (values.mean(), values.std(0)) {
            (Some(mean), Some(std)) if count > 0 => (mean, std),
            _ => {
                return Err(ChurnError::EmptyColumnError {
                    field: field.to_string(),
                    reason: "no finite values".to_string(),
                })
            }
        };

        Ok(Self {
            field: field.to_string(),
            mean,
            std: if std < STD_EPSILON { 1.0 } else { std },
            count,
        })
    }

    #[inline]
    pub fn scale(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// One-hot vocabulary for one categorical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoding {
    pub field: String,
    /// Lowest observed category; encodes as all zeros
    pub reference: String,
    /// Remaining categories, sorted; one output column each
    pub categories: Vec<String>,
}

impl CategoricalEncoding {
    /// Sorted vocabulary of the non-null tokens; the first becomes the reference
    fn fit(field: &str, tokens: &StringChunked) -> Result<Self> {
        let observed: Vec<String> = tokens
            .unique()?
            .sort(false)
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        let n_observed = observed.len();
        let mut sorted = observed.into_iter();
        match sorted.next() {
            Some(reference) if n_observed >= 2 => Ok(Self {
                field: field.to_string(),
                reference,
                categories: sorted.collect(),
            }),
            _ => Err(ChurnError::EmptyColumnError {
                field: field.to_string(),
                reason: format!("needs at least 2 categories, found {}", n_observed),
            }),
        }
    }

    /// Output width of this field
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Full sorted vocabulary, reference first
    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.reference.as_str()).chain(self.categories.iter().map(String::as_str))
    }

    /// Output column of `token` within this field; `None` for the reference
    /// and unseen categories, which encode as all zeros
    fn position(&self, token: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(token)).ok()
    }
}

/// Everything learned by [`ColumnTransformer::fit`].
///
/// Read-only once built; apply it with [`FittedTransformState::transform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformState {
    schema: FeatureSchema,
    numeric: Vec<NumericStats>,
    categorical: Vec<CategoricalEncoding>,
    feature_names: Vec<String>,
}

impl FittedTransformState {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn numeric_stats(&self) -> &[NumericStats] {
        &self.numeric
    }

    pub fn categorical_encodings(&self) -> &[CategoricalEncoding] {
        &self.categorical
    }

    /// Output column names: `field` for numeric, `field_category` for one-hot
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Width of every transformed row
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Transform every row of `df` into a feature matrix
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let start = Instant::now();
        let mut out = Array2::zeros((df.height(), self.n_features()));

        for (j, stats) in self.numeric.iter().enumerate() {
            let series = column(df, &stats.field)?;
            let values = numeric_cells(series)?;
            for (row, (value, dest)) in values.into_iter().zip(out.column_mut(j)).enumerate() {
                *dest = match value {
                    Some(v) => stats.scale(v),
                    None => return Err(invalid_numeric(&stats.field, row, &cell(series, row)?)),
                };
            }
        }

        let mut offset = self.numeric.len();
        for encoding in &self.categorical {
            let tokens = category_tokens(column(df, &encoding.field)?)?;
            for (row, token) in tokens.into_iter().enumerate() {
                let token = token.ok_or_else(|| missing_category(&encoding.field, row))?;
                if let Some(pos) = encoding.position(token) {
                    out[[row, offset + pos]] = 1.0;
                }
            }
            offset += encoding.width();
        }

        debug!(
            rows = df.height(),
            features = self.n_features(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Transformed records"
        );
        Ok(out)
    }

    /// Transform a single record
    pub fn transform_record(&self, record: &Record) -> Result<Array1<f64>> {
        let lookup = |field: &str| {
            record
                .get(field)
                .ok_or_else(|| ChurnError::SchemaError(format!("field '{}' not found", field)))
        };
        let numeric = self
            .numeric
            .iter()
            .map(|s| lookup(&s.field))
            .collect::<Result<Vec<_>>>()?;
        let categorical = self
            .categorical
            .iter()
            .map(|e| lookup(&e.field))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Array1::zeros(self.n_features());
        self.encode_record(&numeric, &categorical, out.view_mut())?;
        Ok(out)
    }

    fn encode_record(
        &self,
        numeric: &[&RawValue],
        categorical: &[&RawValue],
        mut out: ArrayViewMut1<f64>,
    ) -> Result<()> {
        for (j, (stats, value)) in self.numeric.iter().zip(numeric).enumerate() {
            let v = value
                .as_number()
                .ok_or_else(|| invalid_numeric(&stats.field, 0, value))?;
            out[j] = stats.scale(v);
        }

        let mut offset = self.numeric.len();
        for (encoding, value) in self.categorical.iter().zip(categorical) {
            let token = value
                .category_token()
                .ok_or_else(|| missing_category(&encoding.field, 0))?;
            if let Some(pos) = encoding.position(&token) {
                out[offset + pos] = 1.0;
            }
            offset += encoding.width();
        }
        Ok(())
    }
}

fn invalid_numeric(field: &str, row: usize, value: &RawValue) -> ChurnError {
    ChurnError::InvalidValue {
        field: field.to_string(),
        row,
        reason: if value.is_missing() {
            "missing value".to_string()
        } else {
            format!("non-numeric value '{}'", value)
        },
    }
}

fn missing_category(field: &str, row: usize) -> ChurnError {
    ChurnError::InvalidValue {
        field: field.to_string(),
        row,
        reason: "missing value".to_string(),
    }
}

/// Fits a [`FittedTransformState`] for one schema
#[derive(Debug, Clone)]
pub struct ColumnTransformer {
    schema: FeatureSchema,
}

impl ColumnTransformer {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Learn per-field state from training records only.
    ///
    /// Missing cells are skipped. A present value in a numeric field that
    /// does not parse is an [`ChurnError::InvalidValue`].
    pub fn fit(&self, df: &DataFrame) -> Result<FittedTransformState> {
        let start = Instant::now();
        let mut numeric = Vec::with_capacity(self.schema.numeric().len());
        let mut categorical = Vec::with_capacity(self.schema.categorical().len());

        for (field, column_type) in self.schema.fields() {
            let series = column(df, field)?;
            match column_type {
                ColumnType::Numeric => {
                    let values = numeric_cells(series)?;
                    let unparsed = &present_cells(series)? & &values.is_null();
                    if let Some(row) = unparsed.into_iter().position(|b| b == Some(true)) {
                        return Err(invalid_numeric(field, row, &cell(series, row)?));
                    }
                    numeric.push(NumericStats::fit(field, &values)?);
                }
                ColumnType::Categorical => {
                    categorical.push(CategoricalEncoding::fit(field, &category_tokens(series)?)?);
                }
            }
        }

        let feature_names = numeric
            .iter()
            .map(|s| s.field.clone())
            .chain(categorical.iter().flat_map(|e| {
                e.categories.iter().map(move |c| format!("{}_{}", e.field, c))
            }))
            .collect::<Vec<_>>();

        info!(
            rows = df.height(),
            numeric = numeric.len(),
            categorical = categorical.len(),
            features = feature_names.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitted column transformer"
        );

        Ok(FittedTransformState {
            schema: self.schema.clone(),
            numeric,
            categorical,
            feature_names,
        })
    }

    /// Fit on `df` and transform it in one step
    pub fn fit_transform(&self, df: &DataFrame) -> Result<(FittedTransformState, Array2<f64>)> {
        let state = self.fit(df)?;
        let x = state.transform(df)?;
        Ok((state, x))
    }
}
