//! Feature preprocessing module
//!
//! Turns raw records into a fixed-width numeric matrix:
//! - Schema resolution (numeric vs categorical fields, exclusions)
//! - Standard scaling of numeric fields with a zero-std policy
//! - One-hot encoding of categorical fields, lowest category dropped
//!
//! Fitting produces an immutable [`FittedTransformState`] that is applied
//! identically to training, test and inference records.

pub mod schema;
pub mod transformer;

pub use schema::{ColumnType, ExplicitSchema, FeatureSchema, SchemaResolver};
pub use transformer::{
    CategoricalEncoding, ColumnTransformer, FittedTransformState, NumericStats, STD_EPSILON,
};
