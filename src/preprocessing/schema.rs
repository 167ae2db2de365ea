//! Feature schema resolution
//!
//! Splits the columns of a [`DataFrame`] into numeric and categorical
//! groups, leaving out the identifier and target fields.

use crate::data::{column, has_field, numeric_cells, present_cells};
use crate::error::{ChurnError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Column data type for preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
}

/// Ordered, disjoint partition of feature fields.
///
/// Numeric fields come first in the feature vector, then categorical ones,
/// each group in the order stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    numeric: Vec<String>,
    categorical: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty, duplicated or overlapping declarations
    pub fn new(numeric: Vec<String>, categorical: Vec<String>) -> Result<Self> {
        if numeric.is_empty() && categorical.is_empty() {
            return Err(ChurnError::SchemaError("no feature fields".to_string()));
        }

        let mut seen = HashSet::with_capacity(numeric.len() + categorical.len());
        for name in numeric.iter().chain(categorical.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(ChurnError::SchemaError(format!(
                    "field '{}' declared more than once",
                    name
                )));
            }
        }

        Ok(Self {
            numeric,
            categorical,
        })
    }

    pub fn numeric(&self) -> &[String] {
        &self.numeric
    }

    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    /// Number of fields in the schema (not the encoded width)
    pub fn len(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self, field: &str) -> Option<ColumnType> {
        if self.numeric.iter().any(|f| f == field) {
            Some(ColumnType::Numeric)
        } else if self.categorical.iter().any(|f| f == field) {
            Some(ColumnType::Categorical)
        } else {
            None
        }
    }

    /// All fields in feature order
    pub fn fields(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.numeric
            .iter()
            .map(|f| (f.as_str(), ColumnType::Numeric))
            .chain(self.categorical.iter().map(|f| (f.as_str(), ColumnType::Categorical)))
    }
}

/// Caller-declared field groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitSchema {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

/// Derives a [`FeatureSchema`] from a table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaResolver {
    exclude: Vec<String>,
    explicit: Option<ExplicitSchema>,
}

impl SchemaResolver {
    /// Resolver excluding the given fields (identifier, target, ...)
    pub fn new<I, S>(exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: exclude.into_iter().map(Into::into).collect(),
            explicit: None,
        }
    }

    /// Use declared field groups instead of inferring them
    pub fn with_explicit(mut self, explicit: ExplicitSchema) -> Self {
        self.explicit = Some(explicit);
        self
    }

    pub fn excluded(&self) -> &[String] {
        &self.exclude
    }

    pub fn resolve(&self, df: &DataFrame) -> Result<FeatureSchema> {
        for name in &self.exclude {
            if !has_field(df, name) {
                return Err(ChurnError::SchemaError(format!(
                    "excluded field '{}' not found",
                    name
                )));
            }
        }

        let schema = match &self.explicit {
            Some(explicit) => self.validate_explicit(df, explicit)?,
            None => self.infer(df)?,
        };

        debug!(
            numeric = schema.numeric().len(),
            categorical = schema.categorical().len(),
            "Resolved feature schema"
        );
        Ok(schema)
    }

    /// A field is numeric when every present value reads as a finite number:
    /// numeric dtypes always, text columns when parsing nulls out no present
    /// cell.
    fn infer(&self, df: &DataFrame) -> Result<FeatureSchema> {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for name in df.get_column_names_str() {
            if self.exclude.iter().any(|e| e == name) {
                continue;
            }
            if is_numeric_column(column(df, name)?)? {
                numeric.push(name.to_string());
            } else {
                categorical.push(name.to_string());
            }
        }

        FeatureSchema::new(numeric, categorical)
    }

    fn validate_explicit(&self, df: &DataFrame, explicit: &ExplicitSchema) -> Result<FeatureSchema> {
        for name in explicit.numeric.iter().chain(explicit.categorical.iter()) {
            if !has_field(df, name) {
                return Err(ChurnError::SchemaError(format!(
                    "declared field '{}' not found",
                    name
                )));
            }
            if self.exclude.contains(name) {
                return Err(ChurnError::SchemaError(format!(
                    "declared field '{}' is excluded",
                    name
                )));
            }
        }

        FeatureSchema::new(explicit.numeric.clone(), explicit.categorical.clone())
    }
}

fn is_numeric_column(series: &Series) -> Result<bool> {
    match series.dtype() {
        dtype if dtype.is_primitive_numeric() => Ok(true),
        DataType::String => {
            let parsed = numeric_cells(series)?;
            let present = present_cells(series)?.num_trues();
            Ok(parsed.len() - parsed.null_count() == present)
        }
        _ => Ok(false),
    }
}
