//! Built-in transform steps
//!
//! Every step reads typed columns and writes typed columns; none of them
//! re-parses text into numbers or dates. Rows are reported 1-indexed in
//! errors, matching validation reports.

use chrono::NaiveDate;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use tradeboard_core::{Column, ColumnData, ColumnType, Dataset, StepSpec, TextCase, Value};
use crate::step::{numeric, text, StepError, TransformStep};

/// Build the executable step for a configured step
pub fn build_step(spec: &StepSpec) -> Arc<dyn TransformStep> {
    match spec {
        StepSpec::TrimText { columns } => Arc::new(TrimText {
            columns: columns.clone(),
        }),
        StepSpec::NormalizeCase { column, case } => Arc::new(NormalizeCase {
            column: column.clone(),
            case: *case,
        }),
        StepSpec::FillNulls { column, value } => Arc::new(FillNulls {
            column: column.clone(),
            value: value.clone(),
        }),
        StepSpec::Rename { from, to } => Arc::new(Rename {
            from: from.clone(),
            to: to.clone(),
        }),
        StepSpec::DropColumns { columns } => Arc::new(DropColumns {
            columns: columns.clone(),
        }),
        StepSpec::Scale { column, factor, into } => Arc::new(Scale {
            column: column.clone(),
            factor: *factor,
            into: into.clone(),
        }),
        StepSpec::Ratio {
            numerator,
            denominator,
            into,
        } => Arc::new(Ratio {
            numerator: numerator.clone(),
            denominator: denominator.clone(),
            into: into.clone(),
        }),
        StepSpec::MonthNumber { column, into } => Arc::new(MonthNumber {
            column: column.clone(),
            into: into.clone(),
        }),
        StepSpec::Period { month, year, into } => Arc::new(Period {
            month: month.clone(),
            year: year.clone(),
            into: into.clone(),
        }),
        StepSpec::FilterIn { column, values } => Arc::new(FilterIn {
            column: column.clone(),
            values: values.clone(),
        }),
        StepSpec::Sort { by, descending } => Arc::new(Sort {
            by: by.clone(),
            descending: *descending,
        }),
    }
}

/// Trim text and collapse internal whitespace runs to one space
#[derive(Debug, Clone)]
pub struct TrimText {
    pub columns: Vec<String>,
}

impl TransformStep for TrimText {
    fn name(&self) -> &str {
        "trim_text"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "columns": self.columns })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let mut output = input.clone();
        for name in &self.columns {
            let values = text(&output, name)?
                .iter()
                .map(|v| v.as_deref().map(collapse_whitespace))
                .collect();
            output = output.with_column(Column::text(name.clone(), values))?;
        }
        Ok(output)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
pub struct NormalizeCase {
    pub column: String,
    pub case: TextCase,
}

impl TransformStep for NormalizeCase {
    fn name(&self) -> &str {
        "normalize_case"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "column": self.column, "case": self.case })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let values = text(input, &self.column)?
            .iter()
            .map(|v| v.as_deref().map(|s| change_case(s, self.case)))
            .collect();
        Ok(input.clone().with_column(Column::text(self.column.clone(), values))?)
    }
}

fn change_case(s: &str, case: TextCase) -> String {
    match case {
        TextCase::Upper => s.to_uppercase(),
        TextCase::Lower => s.to_lowercase(),
        TextCase::Title => {
            let mut out = String::with_capacity(s.len());
            let mut word_start = true;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if word_start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    word_start = false;
                } else {
                    out.push(c);
                    word_start = true;
                }
            }
            out
        }
    }
}

/// Replace nulls in a text column with a constant
#[derive(Debug, Clone)]
pub struct FillNulls {
    pub column: String,
    pub value: String,
}

impl TransformStep for FillNulls {
    fn name(&self) -> &str {
        "fill_nulls"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "column": self.column, "value": self.value })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let values = text(input, &self.column)?
            .iter()
            .map(|v| Some(v.clone().unwrap_or_else(|| self.value.clone())))
            .collect();
        Ok(input.clone().with_column(Column::text(self.column.clone(), values))?)
    }
}

#[derive(Debug, Clone)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

impl TransformStep for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "from": self.from, "to": self.to })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        if input.column(&self.from).is_none() {
            return Err(StepError::UnknownColumn(self.from.clone()));
        }
        Ok(input.clone().rename_column(&self.from, &self.to)?)
    }
}

/// Remove columns; names not present are ignored
#[derive(Debug, Clone)]
pub struct DropColumns {
    pub columns: Vec<String>,
}

impl TransformStep for DropColumns {
    fn name(&self) -> &str {
        "drop_columns"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "columns": self.columns })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        Ok(input.clone().without_columns(&self.columns))
    }
}

/// `into = column * factor`
#[derive(Debug, Clone)]
pub struct Scale {
    pub column: String,
    pub factor: f64,
    pub into: String,
}

impl TransformStep for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "column": self.column, "factor": self.factor, "into": self.into })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let values = numeric(input, &self.column)?
            .iter()
            .enumerate()
            .map(|(row, v)| match v {
                Some(v) => finite(v * self.factor, &self.into, row).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(input.clone().with_column(Column::numeric(self.into.clone(), values))?)
    }
}

/// `into = numerator / denominator`; null when either side is null
#[derive(Debug, Clone)]
pub struct Ratio {
    pub numerator: String,
    pub denominator: String,
    pub into: String,
}

impl TransformStep for Ratio {
    fn name(&self) -> &str {
        "ratio"
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "numerator": self.numerator,
            "denominator": self.denominator,
            "into": self.into,
        })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let numerators = numeric(input, &self.numerator)?;
        let denominators = numeric(input, &self.denominator)?;

        let values = numerators
            .iter()
            .zip(denominators)
            .enumerate()
            .map(|(row, pair)| match pair {
                (Some(_), Some(d)) if *d == 0.0 => Err(StepError::DivisionByZero {
                    column: self.into.clone(),
                    row: row + 1,
                }),
                (Some(n), Some(d)) => finite(n / d, &self.into, row).map(Some),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(input.clone().with_column(Column::numeric(self.into.clone(), values))?)
    }
}

fn finite(value: f64, column: &str, row: usize) -> Result<f64, StepError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(StepError::NonFinite {
            column: column.to_string(),
            row: row + 1,
        })
    }
}

/// Month names ("Jan", "Sept", "March") or month numbers to 1..=12
#[derive(Debug, Clone)]
pub struct MonthNumber {
    pub column: String,
    pub into: String,
}

impl TransformStep for MonthNumber {
    fn name(&self) -> &str {
        "month_number"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "column": self.column, "into": self.into })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let column = input
            .column(&self.column)
            .ok_or_else(|| StepError::UnknownColumn(self.column.clone()))?;

        let unknown = |row: usize, value: String| StepError::UnknownMonth {
            column: self.column.clone(),
            row: row + 1,
            value,
        };

        let months: Vec<Option<f64>> = match &column.data {
            ColumnData::Text(values) => values
                .iter()
                .enumerate()
                .map(|(row, v)| match v {
                    Some(name) => month_from_name(name)
                        .map(|m| Some(f64::from(m)))
                        .ok_or_else(|| unknown(row, name.clone())),
                    None => Ok(None),
                })
                .collect::<Result<_, _>>()?,
            // Already numeric: pass through when every value is a month
            ColumnData::Numeric(values) => values
                .iter()
                .enumerate()
                .map(|(row, v)| match v {
                    Some(n) if n.fract() == 0.0 && (1.0..=12.0).contains(n) => Ok(Some(*n)),
                    Some(n) => Err(unknown(row, n.to_string())),
                    None => Ok(None),
                })
                .collect::<Result<_, _>>()?,
            other => {
                return Err(StepError::WrongType {
                    column: self.column.clone(),
                    expected: ColumnType::Text,
                    actual: other.column_type(),
                })
            }
        };

        Ok(input.clone().with_column(Column::numeric(self.into.clone(), months))?)
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.trim().to_ascii_lowercase().as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        other => return other.parse().ok().filter(|m| (1..=12).contains(m)),
    };
    Some(month)
}

/// First day of the month from a month-number column and a year column
#[derive(Debug, Clone)]
pub struct Period {
    pub month: String,
    pub year: String,
    pub into: String,
}

impl TransformStep for Period {
    fn name(&self) -> &str {
        "period"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "month": self.month, "year": self.year, "into": self.into })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let months = numeric(input, &self.month)?;
        let years = numeric(input, &self.year)?;

        let dates = months
            .iter()
            .zip(years)
            .enumerate()
            .map(|(row, pair)| match pair {
                (Some(m), Some(y)) => first_of_month(*m, *y)
                    .map(Some)
                    .ok_or(StepError::InvalidPeriod {
                        row: row + 1,
                        month: *m,
                        year: *y,
                    }),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(input.clone().with_column(Column::date(self.into.clone(), dates))?)
    }
}

fn first_of_month(month: f64, year: f64) -> Option<NaiveDate> {
    if month.fract() != 0.0 || year.fract() != 0.0 || !(1.0..=12.0).contains(&month) {
        return None;
    }
    if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32, 1)
}

/// Keep rows whose value, rendered as text, is one of `values`
///
/// Nulls never match. Numeric values render without a trailing `.0`, so
/// `"2024"` selects the year 2024.
#[derive(Debug, Clone)]
pub struct FilterIn {
    pub column: String,
    pub values: Vec<String>,
}

impl TransformStep for FilterIn {
    fn name(&self) -> &str {
        "filter_in"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "column": self.column, "values": self.values })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let column = input
            .column(&self.column)
            .ok_or_else(|| StepError::UnknownColumn(self.column.clone()))?;

        let keep: Vec<usize> = (0..input.row_count())
            .filter(|&row| {
                let value = column.data.value(row);
                !value.is_null() && self.values.iter().any(|v| *v == value.to_string())
            })
            .collect();

        Ok(input.take_rows(&keep))
    }
}

/// Stable sort by one column; nulls last in both directions
#[derive(Debug, Clone)]
pub struct Sort {
    pub by: String,
    pub descending: bool,
}

impl TransformStep for Sort {
    fn name(&self) -> &str {
        "sort"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "by": self.by, "descending": self.descending })
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset, StepError> {
        let column = input
            .column(&self.by)
            .ok_or_else(|| StepError::UnknownColumn(self.by.clone()))?;

        let keys: Vec<Value> = (0..input.row_count()).map(|row| column.data.value(row)).collect();
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by(|&a, &b| compare_values(&keys[a], &keys[b], self.descending));

        Ok(input.take_rows(&order))
    }
}

fn compare_values(a: &Value, b: &Value, descending: bool) -> Ordering {
    let ordering = match (a, b) {
        (Value::Null, Value::Null) => return Ordering::Equal,
        (Value::Null, _) => return Ordering::Greater,
        (_, Value::Null) => return Ordering::Less,
        (Value::Numeric(x), Value::Numeric(y)) => x.total_cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        // A column holds a single type
        _ => Ordering::Equal,
    };

    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shipments() -> Dataset {
        Dataset::new(vec![
            Column::text(
                "exporter",
                vec![Some("  acme   corp ".into()), None, Some("GLOBEX".into())],
            ),
            Column::numeric("kgs", vec![Some(1500.0), Some(250.0), None]),
            Column::text("month", vec![Some("Sept".into()), Some("jan".into()), Some("March".into())]),
            Column::numeric("year", vec![Some(2023.0), Some(2024.0), Some(2024.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn trim_then_title_case() {
        let ds = TrimText {
            columns: vec!["exporter".into()],
        }
        .apply(&shipments())
        .unwrap();
        let ds = NormalizeCase {
            column: "exporter".into(),
            case: TextCase::Title,
        }
        .apply(&ds)
        .unwrap();

        assert_eq!(
            ds.column("exporter").unwrap().data.as_text().unwrap(),
            &[Some("Acme Corp".to_string()), None, Some("Globex".to_string())]
        );
    }

    #[test]
    fn fill_nulls_with_unknown() {
        let ds = FillNulls {
            column: "exporter".into(),
            value: "Unknown".into(),
        }
        .apply(&shipments())
        .unwrap();
        assert_eq!(ds.row(1)[0], Value::Text("Unknown".into()));
        assert_eq!(ds.column("exporter").unwrap().data.null_count(), 0);
    }

    #[test]
    fn scale_kgs_to_tons() {
        let ds = Scale {
            column: "kgs".into(),
            factor: 0.001,
            into: "tons".into(),
        }
        .apply(&shipments())
        .unwrap();
        assert_eq!(ds.column_count(), 5);
        assert_eq!(ds.row(0)[4], Value::Numeric(1.5));
        assert_eq!(ds.row(2)[4], Value::Null);
    }

    #[test]
    fn scale_overflow_is_an_error() {
        let err = Scale {
            column: "kgs".into(),
            factor: f64::MAX,
            into: "huge".into(),
        }
        .apply(&shipments())
        .unwrap_err();
        assert_eq!(
            err,
            StepError::NonFinite {
                column: "huge".into(),
                row: 1
            }
        );
    }

    #[test]
    fn ratio_rejects_zero_denominator() {
        let ds = Dataset::new(vec![
            Column::numeric("kgs", vec![Some(10.0), Some(4.0)]),
            Column::numeric("shipments", vec![Some(2.0), Some(0.0)]),
        ])
        .unwrap();

        let err = Ratio {
            numerator: "kgs".into(),
            denominator: "shipments".into(),
            into: "avg".into(),
        }
        .apply(&ds)
        .unwrap_err();
        assert_eq!(
            err,
            StepError::DivisionByZero {
                column: "avg".into(),
                row: 2
            }
        );
    }

    #[test]
    fn month_names_and_period() {
        let ds = MonthNumber {
            column: "month".into(),
            into: "month_no".into(),
        }
        .apply(&shipments())
        .unwrap();
        assert_eq!(
            ds.column("month_no").unwrap().data.as_numeric().unwrap(),
            &[Some(9.0), Some(1.0), Some(3.0)]
        );

        let ds = Period {
            month: "month_no".into(),
            year: "year".into(),
            into: "period".into(),
        }
        .apply(&ds)
        .unwrap();
        assert_eq!(
            ds.column("period").unwrap().data.value(0),
            Value::Date(NaiveDate::from_ymd_opt(2023, 9, 1).unwrap())
        );
    }

    #[test]
    fn unknown_month_is_an_error() {
        let ds = Dataset::new(vec![Column::text("month", vec![Some("Smarch".into())])]).unwrap();
        let err = MonthNumber {
            column: "month".into(),
            into: "month_no".into(),
        }
        .apply(&ds)
        .unwrap_err();
        assert!(matches!(err, StepError::UnknownMonth { row: 1, .. }));
    }

    #[test]
    fn filter_by_numeric_year() {
        let ds = FilterIn {
            column: "year".into(),
            values: vec!["2024".into()],
        }
        .apply(&shipments())
        .unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.row(0)[1], Value::Numeric(250.0));
    }

    #[test]
    fn sort_descending_keeps_nulls_last() {
        let ds = Sort {
            by: "kgs".into(),
            descending: true,
        }
        .apply(&shipments())
        .unwrap();
        assert_eq!(
            ds.column("kgs").unwrap().data.as_numeric().unwrap(),
            &[Some(1500.0), Some(250.0), None]
        );
    }

    #[test]
    fn wrong_type_names_both_types() {
        let err = Scale {
            column: "exporter".into(),
            factor: 2.0,
            into: "x".into(),
        }
        .apply(&shipments())
        .unwrap_err();
        assert_eq!(
            err,
            StepError::WrongType {
                column: "exporter".into(),
                expected: ColumnType::Numeric,
                actual: ColumnType::Text
            }
        );
    }

    #[test]
    fn rename_and_drop() {
        let ds = Rename {
            from: "kgs".into(),
            to: "weight".into(),
        }
        .apply(&shipments())
        .unwrap();
        let ds = DropColumns {
            columns: vec!["month".into(), "absent".into()],
        }
        .apply(&ds)
        .unwrap();
        assert_eq!(ds.column_names(), vec!["exporter", "weight", "year"]);
    }

    #[test]
    fn input_is_never_mutated() {
        let input = shipments();
        let before = input.fingerprint();
        let _ = Sort {
            by: "kgs".into(),
            descending: false,
        }
        .apply(&input)
        .unwrap();
        assert_eq!(input.fingerprint(), before);
    }
}
