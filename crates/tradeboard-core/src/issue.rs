//! Validation issue codes and issue records
//!
//! IMPORTANT: Issue codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API
//! (dashboards match on them and severity overrides are keyed by them).

use serde::{Deserialize, Serialize};

/// Issue code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    // Input structure (1xxx)
    /// The input could not be read as a table (no header, ragged rows, ...)
    Structure,

    // Column presence (2xxx)
    /// A column required by the contract is missing from the input
    MissingColumn,

    /// The input carries a column the contract does not declare
    UnexpectedColumn,

    // Cell values (3xxx)
    /// A value cannot be coerced to the column's declared type
    TypeMismatch,

    /// A null in a column declared `nullable = false`
    NullValue,

    /// A value violates a range rule (e.g. negative quantity)
    OutOfRange,

    /// A text value does not match the rule's pattern or allowed set
    PatternMismatch,

    // Row identity (4xxx)
    /// Two rows share the same contract key
    DuplicateKey,
}

impl IssueCode {
    /// Get the issue code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "STRUCTURE",
            Self::MissingColumn => "MISSING_COLUMN",
            Self::UnexpectedColumn => "UNEXPECTED_COLUMN",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::NullValue => "NULL_VALUE",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::PatternMismatch => "PATTERN_MISMATCH",
            Self::DuplicateKey => "DUPLICATE_KEY",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Issue severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - shown to the user but does not block the dataset
    Warn,

    /// Error - the input fails validation
    Error,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Error
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position of a cell in the uploaded table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLocation {
    /// Data row number (1-indexed, header excluded)
    pub row: Option<usize>,

    /// Column name
    pub column: Option<String>,
}

impl CellLocation {
    /// Location of a whole column
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            row: None,
            column: Some(column.into()),
        }
    }

    /// Location of a whole row
    pub fn row(row: usize) -> Self {
        Self {
            row: Some(row),
            column: None,
        }
    }

    /// Location of a single cell
    pub fn cell(row: usize, column: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            column: Some(column.into()),
        }
    }
}

impl std::fmt::Display for CellLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.row, &self.column) {
            (Some(row), Some(column)) => write!(f, "row {}, column '{}'", row, column),
            (Some(row), None) => write!(f, "row {}", row),
            (None, Some(column)) => write!(f, "column '{}'", column),
            (None, None) => write!(f, "input"),
        }
    }
}

/// A single validation finding with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable issue code
    pub code: IssueCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Where in the input the issue was found
    pub location: Option<CellLocation>,

    /// Expected value (type name, rule bound, ...)
    pub expected: Option<String>,

    /// Actual value found in the input
    pub actual: Option<String>,
}

impl Issue {
    /// Create a new issue with minimal fields
    pub fn new(code: IssueCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: CellLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Column name this issue refers to, if any
    pub fn column(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.column.as_deref())
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
