//! Error taxonomy shared by every pipeline tool.
//!
//! All three variants are fatal for a run and surface as a one-line
//! diagnostic with a nonzero exit. Row-level normalization failures are
//! deliberately NOT errors: a single bad ZIP or year degrades to an
//! absent value, gets counted, and is reported by the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required input or flag value is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An expected column (or CRS) is not present in an input schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// The run produced nothing usable: zero joined rows, all geometry
    /// collapsed, an unmatched state name.
    #[error("data quality error: {0}")]
    DataQuality(String),
}

impl PipelineError {
    /// SchemaError for "none of the candidate key columns exist",
    /// enumerating what the dataset actually contains.
    pub fn missing_columns(wanted: &[&str], found: &[String]) -> Self {
        PipelineError::Schema(format!(
            "none of the candidate columns {:?} are present; found columns: {:?}",
            wanted, found
        ))
    }
}
