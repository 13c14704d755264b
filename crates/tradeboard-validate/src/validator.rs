//! Schema validation of raw tables against contracts
//!
//! This module implements the contract check that runs before any transform:
//! it compares a decoded input table against a [`SchemaContract`] and
//! collects every problem as an [`Issue`] instead of failing on the first one.

use std::collections::HashMap;
use tradeboard_core::{
    CellLocation, Column, ColumnData, ColumnSpec, ColumnType, Dataset, DatasetError, Issue,
    IssueCode, RowRule, SchemaContract, Severity, SeverityThreshold, ValidationReport,
};
use crate::coerce::{coerce_boolean, coerce_date, coerce_numeric};
use crate::decode::{decode, DecodeError, Decoded, RawTable};
use crate::input::RawInput;

/// Errors that prevent validation from producing a report
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidateError {
    /// Input bytes are unreadable
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The coerced columns could not be assembled into a dataset
    #[error("Failed to materialize dataset: {0}")]
    Materialize(#[from] DatasetError),
}

/// Report plus, when the verdict is pass, the coerced typed dataset
#[derive(Debug, Clone)]
pub struct Checked {
    pub report: ValidationReport,
    pub dataset: Option<Dataset>,
}

/// Validates raw input against schema contracts
///
/// Checks run in a fixed order:
/// 1. required columns are present (and undeclared columns are flagged)
/// 2. every non-null value coerces to its column's declared type
/// 3. non-nullable columns contain no nulls
/// 4. row rules, then duplicate contract keys
#[derive(Debug, Clone, Default)]
pub struct Validator {
    severity: SeverityThreshold,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply severity overrides by issue code
    pub fn with_severity(mut self, severity: SeverityThreshold) -> Self {
        self.severity = severity;
        self
    }

    /// Validate `input` against `contract`, producing only the report
    pub fn validate(&self, input: &RawInput, contract: &SchemaContract) -> Result<ValidationReport, ValidateError> {
        Ok(self.check(input, contract)?.report)
    }

    /// Validate and, on pass, materialize the typed dataset in the same pass
    pub fn check(&self, input: &RawInput, contract: &SchemaContract) -> Result<Checked, ValidateError> {
        let table = match decode(input.bytes())? {
            Decoded::Table(table) => table,
            Decoded::Malformed { message, row } => {
                let mut issue = Issue::new(IssueCode::Structure, Severity::Error, message);
                if let Some(row) = row {
                    issue = issue.with_location(CellLocation::row(row));
                }
                return Ok(Checked {
                    report: ValidationReport::structure_failure(contract.name(), issue),
                    dataset: None,
                });
            }
        };

        self.check_table(&table, contract)
    }

    /// Validate an already decoded table
    pub fn check_table(&self, table: &RawTable, contract: &SchemaContract) -> Result<Checked, ValidateError> {
        let mut issues = Vec::new();

        // (a) presence
        let positions: Vec<Option<usize>> = contract
            .columns()
            .iter()
            .map(|spec| table.column_index(&spec.name))
            .collect();

        for (spec, position) in contract.columns().iter().zip(&positions) {
            if position.is_none() && spec.required {
                issues.push(
                    self.issue(
                        IssueCode::MissingColumn,
                        Severity::Error,
                        format!("Column '{}' is required by contract '{}' but missing", spec.name, contract.name()),
                    )
                    .with_location(CellLocation::column(&spec.name))
                    .with_comparison(spec.column_type.to_string(), "<missing>"),
                );
            }
        }

        if !contract.allows_extra_columns() {
            for header in &table.headers {
                if contract.find_column(header).is_none() {
                    issues.push(
                        self.issue(
                            IssueCode::UnexpectedColumn,
                            Severity::Warn,
                            format!("Column '{}' is not declared in contract '{}'", header, contract.name()),
                        )
                        .with_location(CellLocation::column(header)),
                    );
                }
            }
        }

        // (b) types
        let mut typed: Vec<ColumnData> = Vec::with_capacity(positions.len());
        for (spec, position) in contract.columns().iter().zip(&positions) {
            let data = match position {
                Some(index) => self.coerce_column(table, *index, spec, &mut issues),
                None => ColumnData::nulls(spec.column_type, table.row_count()),
            };
            typed.push(data);
        }

        // (c) nullability, checked on the raw cells so type mismatches are not double counted
        for (spec, position) in contract.columns().iter().zip(&positions) {
            let Some(index) = position else { continue };
            if spec.nullable {
                continue;
            }
            for row in 0..table.row_count() {
                if table.cell(row, *index).is_none() {
                    issues.push(
                        self.issue(
                            IssueCode::NullValue,
                            Severity::Error,
                            format!("Column '{}' must not be empty", spec.name),
                        )
                        .with_location(CellLocation::cell(row + 1, &spec.name)),
                    );
                }
            }
        }

        // (d) row rules and keys
        for (index, rule) in contract.rules().iter().enumerate() {
            let Some(column) = contract.columns().iter().position(|c| c.name == rule.column()) else {
                continue;
            };
            if positions[column].is_none() {
                continue;
            }
            self.apply_rule(contract, index, rule, &typed[column], &mut issues);
        }

        if !contract.key().is_empty() {
            self.check_keys(table, contract, &mut issues);
        }

        let report = ValidationReport::from_issues(contract.name(), issues, table.row_count());

        let dataset = if report.passed() {
            let columns = contract
                .columns()
                .iter()
                .zip(typed)
                .map(|(spec, data)| Column::new(spec.name.clone(), data))
                .collect();
            Some(Dataset::new(columns)?)
        } else {
            None
        };

        Ok(Checked { report, dataset })
    }

    fn issue(&self, code: IssueCode, default: Severity, message: String) -> Issue {
        Issue::new(code, self.severity.get_severity(code, default), message)
    }

    fn coerce_column(
        &self,
        table: &RawTable,
        index: usize,
        spec: &ColumnSpec,
        issues: &mut Vec<Issue>,
    ) -> ColumnData {
        let mut mismatch = |row: usize, text: &str| {
            issues.push(
                self.issue(
                    IssueCode::TypeMismatch,
                    Severity::Error,
                    format!(
                        "Value '{}' in column '{}' is not a valid {}",
                        text, spec.name, spec.column_type
                    ),
                )
                .with_location(CellLocation::cell(row + 1, &spec.name))
                .with_comparison(spec.column_type.to_string(), text),
            );
        };

        let cells = (0..table.row_count()).map(|row| (row, table.cell(row, index)));

        match spec.column_type {
            ColumnType::Text => ColumnData::Text(cells.map(|(_, c)| c.map(str::to_string)).collect()),
            ColumnType::Numeric => ColumnData::Numeric(
                cells
                    .map(|(row, cell)| {
                        let text = cell?;
                        let value = coerce_numeric(text);
                        if value.is_none() {
                            mismatch(row, text);
                        }
                        value
                    })
                    .collect(),
            ),
            ColumnType::Date => ColumnData::Date(
                cells
                    .map(|(row, cell)| {
                        let text = cell?;
                        let value = coerce_date(text);
                        if value.is_none() {
                            mismatch(row, text);
                        }
                        value
                    })
                    .collect(),
            ),
            ColumnType::Boolean => ColumnData::Boolean(
                cells
                    .map(|(row, cell)| {
                        let text = cell?;
                        let value = coerce_boolean(text);
                        if value.is_none() {
                            mismatch(row, text);
                        }
                        value
                    })
                    .collect(),
            ),
        }
    }

    fn apply_rule(
        &self,
        contract: &SchemaContract,
        index: usize,
        rule: &RowRule,
        data: &ColumnData,
        issues: &mut Vec<Issue>,
    ) {
        let column = rule.column();
        let severity = rule.severity();

        match rule {
            RowRule::NonNegative { .. } => {
                for (row, value) in numeric_cells(data) {
                    if value < 0.0 {
                        issues.push(
                            self.issue(
                                IssueCode::OutOfRange,
                                severity,
                                format!("Column '{}' must not be negative, found {}", column, value),
                            )
                            .with_location(CellLocation::cell(row + 1, column))
                            .with_comparison(">= 0", value.to_string()),
                        );
                    }
                }
            }
            RowRule::Integer { .. } => {
                for (row, value) in numeric_cells(data) {
                    if value.fract() != 0.0 {
                        issues.push(
                            self.issue(
                                IssueCode::OutOfRange,
                                severity,
                                format!("Column '{}' must hold whole numbers, found {}", column, value),
                            )
                            .with_location(CellLocation::cell(row + 1, column))
                            .with_comparison("whole number", value.to_string()),
                        );
                    }
                }
            }
            RowRule::Range { min, max, .. } => {
                for (row, value) in numeric_cells(data) {
                    let below = min.is_some_and(|m| value < m);
                    let above = max.is_some_and(|m| value > m);
                    if below || above {
                        let bounds = format!(
                            "[{}, {}]",
                            min.map_or("-inf".to_string(), |m| m.to_string()),
                            max.map_or("+inf".to_string(), |m| m.to_string())
                        );
                        issues.push(
                            self.issue(
                                IssueCode::OutOfRange,
                                severity,
                                format!("Column '{}' value {} is outside {}", column, value, bounds),
                            )
                            .with_location(CellLocation::cell(row + 1, column))
                            .with_comparison(bounds, value.to_string()),
                        );
                    }
                }
            }
            RowRule::Pattern { regex, .. } => {
                let Some(pattern) = contract.rule_pattern(index) else { return };
                for (row, text) in text_cells(data) {
                    if !pattern.is_match(text) {
                        issues.push(
                            self.issue(
                                IssueCode::PatternMismatch,
                                severity,
                                format!("Column '{}' value '{}' does not match /{}/", column, text, regex),
                            )
                            .with_location(CellLocation::cell(row + 1, column))
                            .with_comparison(regex.clone(), text),
                        );
                    }
                }
            }
            RowRule::OneOf { values, .. } => {
                for (row, text) in text_cells(data) {
                    if !values.iter().any(|v| v == text) {
                        issues.push(
                            self.issue(
                                IssueCode::PatternMismatch,
                                severity,
                                format!("Column '{}' value '{}' is not an allowed value", column, text),
                            )
                            .with_location(CellLocation::cell(row + 1, column))
                            .with_comparison(values.join("|"), text),
                        );
                    }
                }
            }
        }
    }

    fn check_keys(&self, table: &RawTable, contract: &SchemaContract, issues: &mut Vec<Issue>) {
        let indices: Vec<usize> = contract
            .key()
            .iter()
            .filter_map(|k| table.column_index(k))
            .collect();
        // A missing key column was already reported as MISSING_COLUMN
        if indices.len() != contract.key().len() {
            return;
        }

        let mut first_seen: HashMap<Vec<Option<&str>>, usize> = HashMap::new();
        for row in 0..table.row_count() {
            let key: Vec<Option<&str>> = indices.iter().map(|&i| table.cell(row, i)).collect();
            match first_seen.get(&key) {
                Some(&first) => {
                    let shown: Vec<&str> = key.iter().map(|k| k.unwrap_or("")).collect();
                    issues.push(
                        self.issue(
                            IssueCode::DuplicateKey,
                            Severity::Error,
                            format!(
                                "Row {} repeats key ({}) first seen in row {}",
                                row + 1,
                                shown.join(", "),
                                first + 1
                            ),
                        )
                        .with_location(CellLocation::row(row + 1))
                        .with_comparison(format!("unique {}", contract.key().join(", ")), shown.join(", ")),
                    );
                }
                None => {
                    first_seen.insert(key, row);
                }
            }
        }
    }
}

fn numeric_cells(data: &ColumnData) -> impl Iterator<Item = (usize, f64)> + '_ {
    data.as_numeric()
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(row, v)| v.map(|v| (row, v)))
}

fn text_cells(data: &ColumnData) -> impl Iterator<Item = (usize, &str)> + '_ {
    data.as_text()
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(row, v)| v.as_deref().map(|v| (row, v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tradeboard_core::{Value, Verdict};

    fn supplier_contract() -> SchemaContract {
        SchemaContract::builder("supplier")
            .column(ColumnSpec::new("supplier", ColumnType::Text).not_null())
            .column(ColumnSpec::new("qty", ColumnType::Numeric).not_null())
            .column(ColumnSpec::new("date", ColumnType::Date))
            .rule(RowRule::NonNegative {
                column: "qty".into(),
                severity: Severity::Error,
            })
            .build()
            .unwrap()
    }

    fn input(csv: &str) -> RawInput {
        RawInput::from_bytes(csv.as_bytes().to_vec(), "supplier")
    }

    #[test]
    fn valid_input_passes_and_materializes() {
        let checked = Validator::new()
            .check(
                &input("supplier,qty,date\nAcme,10,2024-01-05\nGlobex,\"1,200\",\n"),
                &supplier_contract(),
            )
            .unwrap();

        assert_eq!(checked.report.verdict, Verdict::Pass);
        assert_eq!(checked.report.summary.errors, 0);

        let ds = checked.dataset.unwrap();
        assert_eq!(ds.column_names(), vec!["supplier", "qty", "date"]);
        assert_eq!(ds.row(1)[1], Value::Numeric(1200.0));
        assert_eq!(ds.row(1)[2], Value::Null);
    }

    #[test]
    fn missing_column_names_the_column() {
        let report = Validator::new()
            .validate(&input("supplier,date\nAcme,2024-01-05\n"), &supplier_contract())
            .unwrap();

        assert_eq!(report.verdict, Verdict::Fail);
        let missing: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::MissingColumn)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].column(), Some("qty"));
        assert!(missing[0].message.contains("qty"));
    }

    #[test]
    fn non_numeric_quantity_is_one_type_mismatch() {
        let checked = Validator::new()
            .check(
                &input("supplier,qty,date\nAcme,10,2024-01-05\nGlobex,abc,2024-01-06\n"),
                &supplier_contract(),
            )
            .unwrap();

        assert_eq!(checked.report.verdict, Verdict::Fail);
        assert_eq!(checked.report.issues.len(), 1);
        let issue = &checked.report.issues[0];
        assert_eq!(issue.code, IssueCode::TypeMismatch);
        assert_eq!(issue.location, Some(CellLocation::cell(2, "qty")));
        assert_eq!(issue.actual.as_deref(), Some("abc"));
        assert!(checked.dataset.is_none());
    }

    #[test]
    fn nulls_in_required_values() {
        let report = Validator::new()
            .validate(&input("supplier,qty,date\n,5,\nAcme,,\n"), &supplier_contract())
            .unwrap();

        let nulls: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::NullValue)
            .map(|i| i.location.clone().unwrap())
            .collect();
        assert_eq!(
            nulls,
            vec![CellLocation::cell(1, "supplier"), CellLocation::cell(2, "qty")]
        );
    }

    #[test]
    fn negative_quantity_is_out_of_range() {
        let report = Validator::new()
            .validate(&input("supplier,qty,date\nAcme,-3,\n"), &supplier_contract())
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::OutOfRange);
    }

    #[test]
    fn check_order_is_types_then_nulls_then_rules() {
        let report = Validator::new()
            .validate(&input("supplier,qty,date\n,-1,\nAcme,x,\n"), &supplier_contract())
            .unwrap();

        let codes: Vec<_> = report.issues.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![IssueCode::TypeMismatch, IssueCode::NullValue, IssueCode::OutOfRange]
        );
    }

    #[test]
    fn extra_columns_warn_without_failing() {
        let checked = Validator::new()
            .check(&input("supplier,qty,date,notes\nAcme,1,,hi\n"), &supplier_contract())
            .unwrap();

        assert_eq!(checked.report.verdict, Verdict::Pass);
        assert_eq!(checked.report.summary.warnings, 1);
        // Undeclared columns are not carried into the dataset
        assert!(checked.dataset.unwrap().column("notes").is_none());
    }

    #[test]
    fn optional_column_materializes_as_nulls() {
        let contract = SchemaContract::builder("market")
            .column(ColumnSpec::new("exporter", ColumnType::Text))
            .column(ColumnSpec::new("state", ColumnType::Text).optional())
            .build()
            .unwrap();

        let checked = Validator::new()
            .check(&RawInput::from_bytes(b"exporter\nAcme\n".to_vec(), "market"), &contract)
            .unwrap();

        let ds = checked.dataset.unwrap();
        assert_eq!(ds.column("state").unwrap().data.null_count(), 1);
    }

    #[test]
    fn duplicate_keys_reported_with_first_row() {
        let contract = SchemaContract::builder("market")
            .column(ColumnSpec::new("job_no", ColumnType::Text))
            .column(ColumnSpec::new("kgs", ColumnType::Numeric))
            .key(&["job_no"])
            .build()
            .unwrap();

        let report = Validator::new()
            .validate(
                &RawInput::from_bytes(b"job_no,kgs\nJ1,1\nJ2,2\nJ1,3\n".to_vec(), "market"),
                &contract,
            )
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::DuplicateKey);
        assert_eq!(report.issues[0].location, Some(CellLocation::row(3)));
        assert!(report.issues[0].message.contains("row 1"));
    }

    #[test]
    fn whole_numbers_required() {
        let contract = SchemaContract::builder("market")
            .column(ColumnSpec::new("year", ColumnType::Numeric))
            .rule(RowRule::Integer {
                column: "year".into(),
                severity: Severity::Error,
            })
            .build()
            .unwrap();

        let report = Validator::new()
            .validate(
                &RawInput::from_bytes(b"year\n2024\n2024.5\n".to_vec(), "market"),
                &contract,
            )
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::OutOfRange);
        assert_eq!(report.issues[0].location, Some(CellLocation::cell(2, "year")));
        assert_eq!(report.issues[0].actual.as_deref(), Some("2024.5"));
    }

    #[test]
    fn pattern_and_allowed_values() {
        let contract = SchemaContract::builder("market")
            .column(ColumnSpec::new("state", ColumnType::Text))
            .column(ColumnSpec::new("month", ColumnType::Text))
            .rule(RowRule::Pattern {
                column: "state".into(),
                regex: "[A-Z]{2}".into(),
                severity: Severity::Warn,
            })
            .rule(RowRule::OneOf {
                column: "month".into(),
                values: vec!["Jan".into(), "Feb".into()],
                severity: Severity::Error,
            })
            .build()
            .unwrap();

        let report = Validator::new()
            .validate(
                &RawInput::from_bytes(b"state,month\nCA,Jan\nCalifornia,Mar\n".to_vec(), "market"),
                &contract,
            )
            .unwrap();

        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.errors, 1);
        assert!(report.issues.iter().all(|i| i.code == IssueCode::PatternMismatch));
    }

    #[test]
    fn severity_override_downgrades() {
        let mut severity = SeverityThreshold::default();
        severity.set_override(IssueCode::TypeMismatch, Severity::Warn);

        let checked = Validator::new()
            .with_severity(severity)
            .check(&input("supplier,qty,date\nAcme,abc,\n"), &supplier_contract())
            .unwrap();

        assert!(checked.report.passed());
        // The unparseable cell is carried as null
        assert_eq!(checked.dataset.unwrap().row(0)[1], Value::Null);
    }

    #[test]
    fn ragged_input_yields_single_structure_issue() {
        let report = Validator::new()
            .validate(&input("supplier,qty,date\nAcme,1\n"), &supplier_contract())
            .unwrap();

        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::Structure);
    }

    #[test]
    fn unreadable_bytes_are_an_error_not_a_report() {
        let err = Validator::new()
            .validate(&RawInput::from_bytes(vec![0xff, 0xfe], "supplier"), &supplier_contract())
            .unwrap_err();
        assert!(matches!(err, ValidateError::Decode(DecodeError::NotUtf8 { .. })));
    }
}
