//! DataFrame helpers
//!
//! Typed views over raw columns. A raw export mixes numbers, numeric text,
//! blanks and tokens in one column, so every reader here normalizes cells
//! the same way [`RawValue`] does for a single record.

use super::{bool_token, RawValue, Record};
use crate::error::{ChurnError, Result};
use ndarray::Array1;
use polars::prelude::*;

/// Column of `df` as a series; unknown fields are a [`ChurnError::SchemaError`]
pub fn column<'a>(df: &'a DataFrame, field: &str) -> Result<&'a Series> {
    df.column(field)
        .map(|c| c.as_materialized_series())
        .map_err(|_| ChurnError::SchemaError(format!("field '{}' not found", field)))
}

pub fn has_field(df: &DataFrame, field: &str) -> bool {
    df.get_column_index(field).is_some()
}

/// Trimmed text to a finite number
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric view of a column.
///
/// Numeric dtypes are cast to `Float64`, text is trimmed and parsed.
/// Blank, unparseable and non-finite cells are null.
pub fn numeric_cells(series: &Series) -> Result<Float64Chunked> {
    let values: Float64Chunked = match series.dtype() {
        DataType::String => series.str()?.into_iter().map(|v| v.and_then(parse_number)).collect(),
        dtype if dtype.is_primitive_numeric() => {
            let cast = series.cast(&DataType::Float64)?;
            cast.f64()?.into_iter().map(|v| v.filter(|x| x.is_finite())).collect()
        }
        _ => Float64Chunked::full_null(series.name().clone(), series.len()),
    };
    Ok(values.with_name(series.name().clone()))
}

/// Cells carrying a value: non-null, and non-blank for text
pub fn present_cells(series: &Series) -> Result<BooleanChunked> {
    let present: BooleanChunked = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.is_some_and(|s| !s.trim().is_empty()))
            .collect(),
        _ => series.is_not_null(),
    };
    Ok(present.with_name(series.name().clone()))
}

/// One-hot category token per cell, `None` when missing.
///
/// Text is trimmed, numbers render as in [`RawValue::category_token`], so a
/// record and a table row of the same customer produce the same tokens.
pub fn category_tokens(series: &Series) -> Result<StringChunked> {
    let tokens: StringChunked = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map(str::trim).filter(|s| !s.is_empty()))
            .collect(),
        DataType::Boolean => series.bool()?.into_iter().map(|v| v.map(bool_token)).collect(),
        dtype if dtype.is_primitive_numeric() => {
            let cast = series.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()).map(|x| x.to_string()))
                .collect()
        }
        other => {
            return Err(ChurnError::DataError(format!(
                "field '{}' has unsupported dtype {} for categories",
                series.name(),
                other
            )))
        }
    };
    Ok(tokens.with_name(series.name().clone()))
}

/// One cell as a [`RawValue`]
pub fn cell(series: &Series, row: usize) -> Result<RawValue> {
    Ok(raw_value(series.get(row)?))
}

fn raw_value(value: AnyValue) -> RawValue {
    match value {
        AnyValue::Null => RawValue::Missing,
        AnyValue::Boolean(b) => RawValue::Bool(b),
        AnyValue::String(s) => RawValue::Text(s.to_string()),
        AnyValue::StringOwned(s) => RawValue::Text(s.to_string()),
        other => match other.extract::<f64>() {
            Some(v) => RawValue::Number(v),
            None => RawValue::Text(other.to_string()),
        },
    }
}

/// Materialize one row as a [`Record`]
pub fn record(df: &DataFrame, row: usize) -> Result<Record> {
    if row >= df.height() {
        return Err(ChurnError::shape(format!("row < {}", df.height()), format!("row {}", row)));
    }
    let mut out = Record::new();
    for c in df.get_columns() {
        out.insert(c.name().to_string(), cell(c.as_materialized_series(), row)?);
    }
    Ok(out)
}

/// Build a frame from records.
///
/// Fields are ordered by first appearance; a field absent from a record is
/// null. A column whose present values are all numbers becomes `Float64`,
/// all booleans `Boolean`, anything else `String`.
pub fn from_records(records: impl IntoIterator<Item = Record>) -> Result<DataFrame> {
    let records: Vec<Record> = records.into_iter().collect();

    let mut fields: Vec<&str> = Vec::new();
    for record in &records {
        for name in record.fields() {
            if !fields.contains(&name) {
                fields.push(name);
            }
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(fields.len());
    for &name in &fields {
        let cells: Vec<&RawValue> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(&RawValue::Missing))
            .collect();

        let all = |pred: fn(&RawValue) -> bool| {
            cells.iter().all(|v| matches!(v, RawValue::Missing) || pred(v))
        };
        let series = if all(|v| matches!(v, RawValue::Number(_))) {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|v| match v {
                    RawValue::Number(x) => Some(*x),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values)
        } else if all(|v| matches!(v, RawValue::Bool(_))) {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|v| match v {
                    RawValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values)
        } else {
            let values: Vec<Option<String>> = cells.iter().map(|v| v.to_text()).collect();
            Series::new(name.into(), values)
        };
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

/// Extract the binary target column.
///
/// Accepts numbers and numeric text equal to 0 or 1; anything else,
/// including a missing cell, is a [`ChurnError::InvalidLabel`].
pub fn labels(df: &DataFrame, target: &str) -> Result<Array1<u8>> {
    let series = column(df, target)?;
    numeric_cells(series)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(v) if v == 0.0 => Ok(0u8),
            Some(v) if v == 1.0 => Ok(1u8),
            _ => Err(ChurnError::InvalidLabel {
                row,
                value: format!("{:?}", cell(series, row)?),
            }),
        })
        .collect::<Result<Vec<u8>>>()
        .map(Array1::from_vec)
}

/// New frame holding the given rows, in the given order
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    if let Some(&bad) = rows.iter().find(|&&i| i >= df.height()) {
        return Err(ChurnError::shape(format!("row < {}", df.height()), format!("row {}", bad)));
    }
    let idx = IdxCa::from_vec("rows".into(), rows.iter().map(|&i| i as IdxSize).collect());
    Ok(df.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed() -> DataFrame {
        DataFrame::new(vec![
            Series::new("Total".into(), &[Some("12.5"), Some(" 3 "), Some(" "), None, Some("n/a")]).into(),
            Series::new("tenure".into(), &[Some(1i64), Some(2), None, Some(4), Some(5)]).into(),
            Series::new("Churn".into(), &[1.0, 0.0, 0.0, 1.0, 0.0]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_numeric_cells_parse_trimmed_text() {
        let df = mixed();
        let total = numeric_cells(column(&df, "Total").unwrap()).unwrap();
        assert_eq!(total.into_iter().collect::<Vec<_>>(), vec![Some(12.5), Some(3.0), None, None, None]);

        let present = present_cells(column(&df, "Total").unwrap()).unwrap();
        assert_eq!(present.num_trues(), 3);

        let tenure = numeric_cells(column(&df, "tenure").unwrap()).unwrap();
        assert_eq!(tenure.null_count(), 1);
        assert_eq!(tenure.get(3), Some(4.0));
    }

    #[test]
    fn test_category_tokens_match_record_tokens() {
        let df = DataFrame::new(vec![
            Series::new("InternetService".into(), &[Some(" DSL"), Some("DSL "), Some(""), None]).into(),
            Series::new("SeniorCitizen".into(), &[0i64, 1, 1, 0]).into(),
        ])
        .unwrap();

        let internet = category_tokens(column(&df, "InternetService").unwrap()).unwrap();
        assert_eq!(internet.into_iter().collect::<Vec<_>>(), vec![Some("DSL"), Some("DSL"), None, None]);

        let senior = category_tokens(column(&df, "SeniorCitizen").unwrap()).unwrap();
        assert_eq!(senior.get(1), RawValue::Number(1.0).category_token().as_deref());
    }

    #[test]
    fn test_from_records_unions_fields() {
        let df = from_records(vec![
            Record::new().with("id", "a").with("tenure", 3.0),
            Record::new().with("id", "b").with("gender", "Male"),
        ])
        .unwrap();

        assert_eq!(df.get_column_names_str(), vec!["id", "tenure", "gender"]);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("tenure").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("gender").unwrap().dtype(), &DataType::String);

        let second = record(&df, 1).unwrap();
        assert_eq!(second.get("tenure"), Some(&RawValue::Missing));
        assert_eq!(second.get("gender"), Some(&RawValue::from("Male")));
        assert!(record(&df, 2).is_err());
    }

    #[test]
    fn test_mixed_column_becomes_text() {
        let df = from_records(vec![
            Record::new().with("Total", 10.5),
            Record::new().with("Total", " "),
        ])
        .unwrap();
        assert_eq!(df.column("Total").unwrap().dtype(), &DataType::String);
        assert_eq!(record(&df, 0).unwrap().get("Total"), Some(&RawValue::from("10.5")));
    }

    #[test]
    fn test_labels_validation() {
        let df = from_records(vec![
            Record::new().with("Churn", 1i64),
            Record::new().with("Churn", "0"),
        ])
        .unwrap();
        assert_eq!(labels(&df, "Churn").unwrap().to_vec(), vec![1, 0]);

        let bad = from_records(vec![
            Record::new().with("Churn", 1i64),
            Record::new().with("Churn", "Yes"),
        ])
        .unwrap();
        assert!(matches!(
            labels(&bad, "Churn"),
            Err(ChurnError::InvalidLabel { row: 1, .. })
        ));
        assert!(matches!(labels(&bad, "Exited"), Err(ChurnError::SchemaError(_))));
    }

    #[test]
    fn test_take_rows() {
        let df = mixed();
        let subset = take_rows(&df, &[4, 1]).unwrap();
        assert_eq!(subset.height(), 2);
        assert_eq!(record(&subset, 0).unwrap().get("tenure"), Some(&RawValue::Number(5.0)));
        assert!(matches!(take_rows(&df, &[9]), Err(ChurnError::ShapeError { .. })));
    }
}
