//! Raw customer records
//!
//! Tables are polars [`DataFrame`]s end to end. This module adds the pieces
//! the feature pipeline needs on top of them:
//! - [`RawValue`] - a single untyped cell (number, text token, boolean or missing)
//! - [`Record`] - one customer observation, keyed by field name
//! - [`frame`] - column helpers shared by repair, preprocessing and training
//!
//! Loading from disk and repairing raw exports live in [`loader`] and [`repair`].
//!
//! [`DataFrame`]: polars::prelude::DataFrame

pub mod frame;
pub mod loader;
pub mod repair;

pub use frame::{
    category_tokens, cell, column, from_records, has_field, labels, numeric_cells, parse_number,
    present_cells, record, take_rows,
};
pub use loader::{load_csv, load_json, load_records, write_csv};
pub use repair::{repair, RepairConfig, RepairSummary, UnparseableNumeric};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single raw cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Missing,
}

impl RawValue {
    /// Numeric interpretation of the value, if any.
    ///
    /// Text is trimmed before parsing. Non-finite numbers are not numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => v.is_finite().then_some(*v),
            RawValue::Text(s) => parse_number(s),
            RawValue::Bool(_) | RawValue::Missing => None,
        }
    }

    /// Missing cells and blank text both count as missing
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Missing => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Category token used by the one-hot encoder. Text is trimmed, so
    /// `" DSL"` and `"DSL"` are the same category.
    pub fn category_token(&self) -> Option<String> {
        if self.is_missing() {
            return None;
        }
        match self {
            RawValue::Text(s) => Some(s.trim().to_string()),
            other => other.to_text(),
        }
    }

    /// Text form written into string columns; text is kept verbatim
    pub fn to_text(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Number(v) => Some(v.to_string()),
            RawValue::Bool(b) => Some(bool_token(*b).to_string()),
            RawValue::Missing => None,
        }
    }
}

pub(crate) fn bool_token(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(v) => write!(f, "{}", v),
            RawValue::Text(s) => write!(f, "{}", s),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Missing => write!(f, ""),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Number(v as f64)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Missing)
    }
}

/// One customer observation: field name to raw value, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: Vec<(String, RawValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value for it
    pub fn with(mut self, field: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<RawValue>) {
        let field = field.into();
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// Values in field order
    pub fn values(&self) -> impl Iterator<Item = &RawValue> {
        self.values.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_numeric_interpretation() {
        assert_eq!(RawValue::from(3.5).as_number(), Some(3.5));
        assert_eq!(RawValue::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(RawValue::from("Yes").as_number(), None);
        assert_eq!(RawValue::from(true).as_number(), None);
        assert_eq!(RawValue::Number(f64::NAN).as_number(), None);
        assert!(RawValue::from("  ").is_missing());
        assert!(RawValue::Missing.is_missing());
    }

    #[test]
    fn test_category_token() {
        assert_eq!(RawValue::from("DSL").category_token().as_deref(), Some("DSL"));
        assert_eq!(RawValue::from(1.0).category_token().as_deref(), Some("1"));
        assert_eq!(RawValue::from(false).category_token().as_deref(), Some("False"));
        assert_eq!(RawValue::Missing.category_token(), None);
        assert_eq!(RawValue::from("  ").category_token(), None);
    }

    #[test]
    fn test_category_token_trims_text() {
        assert_eq!(RawValue::from(" DSL ").category_token(), RawValue::from("DSL").category_token());
        assert_eq!(RawValue::from(" DSL").to_text().as_deref(), Some(" DSL"));
    }

    #[test]
    fn test_record_insert_replaces() {
        let mut record = Record::new().with("tenure", 3.0).with("Contract", "One year");
        record.insert("tenure", 5.0);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("tenure"), Some(&RawValue::Number(5.0)));
        assert_eq!(record.fields().collect::<Vec<_>>(), vec!["tenure", "Contract"]);
    }
}
