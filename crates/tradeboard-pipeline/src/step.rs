//! The transform step abstraction

use tradeboard_core::{ColumnType, Dataset, DatasetError};

/// Errors a single step can raise
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Column '{column}' is {actual}, expected {expected}")]
    WrongType {
        column: String,
        expected: ColumnType,
        actual: ColumnType,
    },

    #[error("Result in column '{column}' is not finite at row {row}")]
    NonFinite { column: String, row: usize },

    #[error("Division by zero in column '{column}' at row {row}")]
    DivisionByZero { column: String, row: usize },

    #[error("Unknown month '{value}' in column '{column}' at row {row}")]
    UnknownMonth {
        column: String,
        row: usize,
        value: String,
    },

    #[error("No calendar date for month {month} of year {year} at row {row}")]
    InvalidPeriod { row: usize, month: f64, year: f64 },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// One deterministic, side-effect free dataset transformation
///
/// `apply` never mutates its input; it returns a new dataset. `name` and
/// `params` identify the step in the pipeline version, so two steps that
/// behave differently must differ in at least one of them.
pub trait TransformStep: Send + Sync {
    /// Stable step name (e.g., "scale", "sort")
    fn name(&self) -> &str;

    /// Parameters as canonical JSON
    fn params(&self) -> serde_json::Value;

    /// Produce the transformed dataset
    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError>;
}

/// Numeric values of a column, or a typed error
pub(crate) fn numeric<'a>(dataset: &'a Dataset, name: &str) -> Result<&'a [Option<f64>], StepError> {
    let column = dataset
        .column(name)
        .ok_or_else(|| StepError::UnknownColumn(name.to_string()))?;
    column.data.as_numeric().ok_or_else(|| StepError::WrongType {
        column: name.to_string(),
        expected: ColumnType::Numeric,
        actual: column.column_type(),
    })
}

/// Text values of a column, or a typed error
pub(crate) fn text<'a>(dataset: &'a Dataset, name: &str) -> Result<&'a [Option<String>], StepError> {
    let column = dataset
        .column(name)
        .ok_or_else(|| StepError::UnknownColumn(name.to_string()))?;
    column.data.as_text().ok_or_else(|| StepError::WrongType {
        column: name.to_string(),
        expected: ColumnType::Text,
        actual: column.column_type(),
    })
}
