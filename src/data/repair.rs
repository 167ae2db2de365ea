//! Raw record repair
//!
//! Turns a raw customer export into a table the feature pipeline accepts:
//! binary target, numeric charge columns, and a single negative token for
//! "service absent" variants.

use super::frame::{cell, column, labels, numeric_cells, present_cells};
use crate::error::{ChurnError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What to do with a declared numeric cell that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnparseableNumeric {
    /// Drop the whole record
    #[default]
    DropRecord,
    /// Replace the cell with 0. Conflates "zero" with "unknown"; kept for
    /// parity with reports produced by the legacy preparation step.
    ZeroFill,
}

/// Repair configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Churn target field
    pub target_field: String,
    /// Target token mapped to 1; every other present token maps to 0
    pub positive_token: String,
    /// Fields coerced to numbers
    pub numeric_fields: Vec<String>,
    pub unparseable_numeric: UnparseableNumeric,
    /// Tokens meaning "customer has no such service"
    pub absent_service_tokens: Vec<String>,
    /// Canonical negative token the absent-service tokens are rewritten to
    pub negative_token: String,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            target_field: "Churn".to_string(),
            positive_token: "Yes".to_string(),
            numeric_fields: vec!["Total".to_string()],
            unparseable_numeric: UnparseableNumeric::DropRecord,
            absent_service_tokens: vec![
                "No internet service".to_string(),
                "No phone service".to_string(),
            ],
            negative_token: "No".to_string(),
        }
    }
}

impl RepairConfig {
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_field = target.into();
        self
    }

    pub fn with_numeric_fields(mut self, fields: Vec<String>) -> Self {
        self.numeric_fields = fields;
        self
    }

    pub fn with_unparseable_numeric(mut self, policy: UnparseableNumeric) -> Self {
        self.unparseable_numeric = policy;
        self
    }
}

/// Counts describing what [`repair`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_missing_target: usize,
    pub dropped_unparseable: usize,
    pub zero_filled: usize,
    pub normalized_tokens: usize,
    pub positives: usize,
}

/// Repair a raw frame.
///
/// Steps, in order: drop records with a missing or blank target, map the
/// target to `{0, 1}`, coerce the declared numeric fields, and rewrite
/// absent-service tokens. Already-binary numeric targets pass through.
pub fn repair(df: &DataFrame, config: &RepairConfig) -> Result<(DataFrame, RepairSummary)> {
    let target = column(df, &config.target_field)?;
    let numeric = config
        .numeric_fields
        .iter()
        .map(|name| column(df, name))
        .collect::<Result<Vec<_>>>()?;

    let mut summary = RepairSummary {
        rows_in: df.height(),
        ..Default::default()
    };

    let mut keep = present_cells(target)?;
    summary.dropped_missing_target = df.height() - keep.num_trues();

    let mut repaired = df.clone();
    repaired.with_column(target_labels(target, &config.positive_token)?.into_series())?;

    for series in numeric {
        let values = numeric_cells(series)?;
        let bad = &keep & &values.is_null();
        let n_bad = bad.num_trues();

        let coerced = match config.unparseable_numeric {
            UnparseableNumeric::DropRecord => {
                for row in bad.into_iter().enumerate().filter_map(|(i, b)| (b == Some(true)).then_some(i)) {
                    warn!(field = %series.name(), row, value = %cell(series, row)?, "Dropping record with unparseable numeric value");
                }
                summary.dropped_unparseable += n_bad;
                keep = &keep & &!&bad;
                values
            }
            UnparseableNumeric::ZeroFill => {
                summary.zero_filled += n_bad;
                values
                    .into_iter()
                    .map(|v| Some(v.unwrap_or(0.0)))
                    .collect::<Float64Chunked>()
                    .with_name(series.name().clone())
            }
        };
        repaired.with_column(coerced.into_series())?;
    }

    let mut repaired = repaired.filter(&keep)?;
    summary.rows_out = repaired.height();
    if repaired.height() == 0 {
        return Err(ChurnError::DataError(format!(
            "no records left after repair ({} in)",
            summary.rows_in
        )));
    }

    let text_fields: Vec<PlSmallStr> = repaired
        .get_columns()
        .iter()
        .filter(|c| c.dtype() == &DataType::String)
        .map(|c| c.name().clone())
        .collect();
    for name in text_fields {
        let mut rewritten = 0;
        let values: StringChunked = repaired
            .column(&name)?
            .str()?
            .into_iter()
            .map(|v| match v {
                Some(token) if config.absent_service_tokens.iter().any(|t| t == token) => {
                    rewritten += 1;
                    Some(config.negative_token.as_str())
                }
                other => other,
            })
            .collect();
        if rewritten > 0 {
            summary.normalized_tokens += rewritten;
            repaired.with_column(values.with_name(name).into_series())?;
        }
    }

    summary.positives = labels(&repaired, &config.target_field)?
        .iter()
        .filter(|&&l| l == 1)
        .count();

    info!(
        rows_in = summary.rows_in,
        rows_out = summary.rows_out,
        dropped_missing_target = summary.dropped_missing_target,
        dropped_unparseable = summary.dropped_unparseable,
        zero_filled = summary.zero_filled,
        normalized_tokens = summary.normalized_tokens,
        "Repaired records"
    );

    Ok((repaired, summary))
}

/// Target as `Float64` 0/1: the positive token or a numeric 1 maps to 1
fn target_labels(series: &Series, positive_token: &str) -> Result<Float64Chunked> {
    let mapped: Float64Chunked = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| Some(f64::from(v.is_some_and(|s| s.trim() == positive_token))))
            .collect(),
        DataType::Boolean => series.bool()?.into_iter().map(|v| Some(f64::from(v == Some(true)))).collect(),
        _ => numeric_cells(series)?
            .into_iter()
            .map(|v| Some(f64::from(v == Some(1.0))))
            .collect(),
    };
    Ok(mapped.with_name(series.name().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{from_records, record, RawValue, Record};

    fn raw_frame() -> DataFrame {
        from_records(vec![
            Record::new()
                .with("customerID", "a")
                .with("Churn", "Yes")
                .with("OnlineSecurity", "No internet service")
                .with("Total", "10.5"),
            Record::new()
                .with("customerID", "b")
                .with("Churn", "")
                .with("OnlineSecurity", "Yes")
                .with("Total", "3"),
            Record::new()
                .with("customerID", "c")
                .with("Churn", "No")
                .with("OnlineSecurity", "No")
                .with("Total", " "),
            Record::new()
                .with("customerID", "d")
                .with("Churn", "No")
                .with("OnlineSecurity", "Yes")
                .with("Total", 7.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_repair_drops_unparseable_by_default() {
        let (df, summary) = repair(&raw_frame(), &RepairConfig::default()).unwrap();

        assert_eq!(summary.rows_in, 4);
        assert_eq!(summary.dropped_missing_target, 1);
        assert_eq!(summary.dropped_unparseable, 1);
        assert_eq!(summary.rows_out, 2);
        assert_eq!(summary.positives, 1);
        assert_eq!(summary.normalized_tokens, 1);

        assert_eq!(labels(&df, "Churn").unwrap().to_vec(), vec![1, 0]);
        assert_eq!(df.column("Total").unwrap().dtype(), &DataType::Float64);
        let first = record(&df, 0).unwrap();
        assert_eq!(first.get("OnlineSecurity"), Some(&RawValue::from("No")));
        assert_eq!(first.get("Total"), Some(&RawValue::Number(10.5)));
    }

    #[test]
    fn test_repair_zero_fill_keeps_record() {
        let config = RepairConfig::default().with_unparseable_numeric(UnparseableNumeric::ZeroFill);
        let (df, summary) = repair(&raw_frame(), &config).unwrap();

        assert_eq!(summary.rows_out, 3);
        assert_eq!(summary.zero_filled, 1);
        assert_eq!(record(&df, 1).unwrap().get("Total"), Some(&RawValue::Number(0.0)));
    }

    #[test]
    fn test_repair_is_idempotent_on_binary_target() {
        let (once, _) = repair(&raw_frame(), &RepairConfig::default()).unwrap();
        let (twice, summary) = repair(&once, &RepairConfig::default()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(summary.normalized_tokens, 0);
    }

    #[test]
    fn test_repair_unknown_field() {
        let config = RepairConfig::default().with_numeric_fields(vec!["Missing".to_string()]);
        assert!(matches!(
            repair(&raw_frame(), &config),
            Err(ChurnError::SchemaError(_))
        ));
    }
}
