//! Materialized tabular data
//!
//! A [`Dataset`] is an ordered list of named, typed columns that all share the
//! same row count. Columns are tagged typed arrays rather than dynamically
//! typed cells: values are coerced once, at validation time, and transforms
//! operate on the typed representation.
//!
//! Datasets are never mutated in place. Every operation that changes shape or
//! content consumes or borrows the dataset and returns a new one.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use crate::fingerprint::Fingerprint;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit float
    Numeric,

    /// UTF-8 text
    Text,

    /// Calendar date (no time component)
    Date,

    /// true/false
    Boolean,
}

impl ColumnType {
    fn tag(&self) -> u8 {
        match self {
            Self::Numeric => 1,
            Self::Text => 2,
            Self::Date => 3,
            Self::Boolean => 4,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => write!(f, "NUMERIC"),
            Self::Text => write!(f, "TEXT"),
            Self::Date => write!(f, "DATE"),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// A single cell value, detached from its column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Numeric(f64),
    Text(String),
    Date(NaiveDate),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Numeric(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Typed column storage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    /// An all-null column of the given type
    pub fn nulls(column_type: ColumnType, len: usize) -> Self {
        match column_type {
            ColumnType::Numeric => Self::Numeric(vec![None; len]),
            ColumnType::Text => Self::Text(vec![None; len]),
            ColumnType::Date => Self::Date(vec![None; len]),
            ColumnType::Boolean => Self::Boolean(vec![None; len]),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Numeric(_) => ColumnType::Numeric,
            Self::Text(_) => ColumnType::Text,
            Self::Date(_) => ColumnType::Date,
            Self::Boolean(_) => ColumnType::Boolean,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Date(v) => v.len(),
            Self::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row`, or `Value::Null` when out of bounds
    pub fn value(&self, row: usize) -> Value {
        match self {
            Self::Numeric(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Numeric),
            Self::Text(v) => v
                .get(row)
                .and_then(|s| s.clone())
                .map_or(Value::Null, Value::Text),
            Self::Date(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Date),
            Self::Boolean(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Boolean),
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Numeric(v) => v.get(row).map_or(true, Option::is_none),
            Self::Text(v) => v.get(row).map_or(true, Option::is_none),
            Self::Date(v) => v.get(row).map_or(true, Option::is_none),
            Self::Boolean(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&row| self.is_null(row)).count()
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Self::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&[Option<NaiveDate>]> {
        match self {
            Self::Date(v) => Some(v),
            _ => None,
        }
    }

    /// New column holding the rows at `indices`, in that order
    pub fn take(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|&i| values.get(i).cloned().flatten())
                .collect()
        }

        match self {
            Self::Numeric(v) => Self::Numeric(pick(v, indices)),
            Self::Text(v) => Self::Text(pick(v, indices)),
            Self::Date(v) => Self::Date(pick(v, indices)),
            Self::Boolean(v) => Self::Boolean(pick(v, indices)),
        }
    }

    /// Approximate heap + inline footprint in bytes
    pub fn estimated_size(&self) -> usize {
        use std::mem::size_of;

        match self {
            Self::Numeric(v) => v.len() * size_of::<Option<f64>>(),
            Self::Text(v) => v
                .iter()
                .map(|s| size_of::<Option<String>>() + s.as_ref().map_or(0, String::len))
                .sum(),
            Self::Date(v) => v.len() * size_of::<Option<NaiveDate>>(),
            Self::Boolean(v) => v.len() * size_of::<Option<bool>>(),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Numeric(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Text(values))
    }

    pub fn date(name: impl Into<String>, values: Vec<Option<NaiveDate>>) -> Self {
        Self::new(name, ColumnData::Date(values))
    }

    pub fn boolean(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnData::Boolean(values))
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Errors raised when a dataset's shape invariants would be broken
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RowCountMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
}

/// Ordered collection of equally long, uniquely named columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Build a dataset, checking that names are unique and lengths agree
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let rows = columns.first().map_or(0, Column::len);

        for (i, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(DatasetError::RowCountMismatch {
                    column: column.name.clone(),
                    expected: rows,
                    actual: column.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self { columns, rows })
    }

    /// A dataset with no columns and no rows
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`Dataset::column`] but with an error naming the column
    pub fn require(&self, name: &str) -> Result<&Column, DatasetError> {
        self.column(name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// All values of one row, in column order
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.data.value(row)).collect()
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// New dataset with `column` replacing the same-named column, or appended
    pub fn with_column(self, column: Column) -> Result<Self, DatasetError> {
        let mut columns = self.columns;
        match columns.iter().position(|c| c.name == column.name) {
            Some(pos) => columns[pos] = column,
            None => columns.push(column),
        }
        Self::new(columns)
    }

    /// New dataset without the named columns; unknown names are ignored
    pub fn without_columns(self, names: &[String]) -> Self {
        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .filter(|c| !names.contains(&c.name))
            .collect();
        let rows = if columns.is_empty() { 0 } else { self.rows };
        Self { columns, rows }
    }

    /// New dataset with one column renamed
    pub fn rename_column(self, from: &str, to: &str) -> Result<Self, DatasetError> {
        if self.column(from).is_none() {
            return Err(DatasetError::UnknownColumn(from.to_string()));
        }
        let columns = self
            .columns
            .into_iter()
            .map(|mut c| {
                if c.name == from {
                    c.name = to.to_string();
                }
                c
            })
            .collect();
        Self::new(columns)
    }

    /// New dataset holding the rows at `indices`, in that order
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
            .collect();
        Self {
            columns,
            rows: indices.len(),
        }
    }

    /// Approximate in-memory size in bytes, used for cache accounting
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .columns
                .iter()
                .map(|c| std::mem::size_of::<Column>() + c.name.len() + c.data.estimated_size())
                .sum::<usize>()
    }

    /// SHA-256 over a canonical encoding of names, types and values
    ///
    /// Two datasets have the same fingerprint iff they are value-identical,
    /// including float bit patterns.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new().domain("dataset/v1").u64(self.rows as u64);

        for column in &self.columns {
            fp = fp
                .str(&column.name)
                .u64(column.column_type().tag() as u64);

            for row in 0..self.rows {
                fp = match column.data.value(row) {
                    Value::Null => fp.u64(0),
                    Value::Numeric(n) => fp.u64(1).u64(n.to_bits()),
                    Value::Text(s) => fp.u64(2).str(&s),
                    Value::Date(d) => fp.u64(3).u64(d.num_days_from_ce() as i64 as u64),
                    Value::Boolean(b) => fp.u64(4).u64(b as u64),
                };
            }
        }

        fp.finish()
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::empty()
    }
}
