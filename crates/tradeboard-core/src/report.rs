//! Validation report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::issue::{Issue, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Overall outcome of a validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of issues
    pub total: usize,

    /// Number of errors
    pub errors: usize,

    /// Number of warnings
    pub warnings: usize,

    /// Number of info messages
    pub info: usize,

    /// Number of data rows inspected
    pub rows_checked: usize,
}

/// Validation report
///
/// Built once per validation call and never mutated afterwards; the verdict is
/// derived from the issues at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Schema version
    pub version: ReportVersion,

    /// Contract the input was checked against
    pub contract: String,

    /// Pass iff no issue has error severity
    pub verdict: Verdict,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All issues, in discovery order
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// Create a report from issues
    pub fn from_issues(contract: impl Into<String>, issues: Vec<Issue>, rows_checked: usize) -> Self {
        let summary = ReportSummary {
            total: issues.len(),
            errors: issues.iter().filter(|i| i.severity == Severity::Error).count(),
            warnings: issues.iter().filter(|i| i.severity == Severity::Warn).count(),
            info: issues.iter().filter(|i| i.severity == Severity::Info).count(),
            rows_checked,
        };

        let verdict = if summary.errors == 0 { Verdict::Pass } else { Verdict::Fail };

        Self {
            version: ReportVersion::CURRENT,
            contract: contract.into(),
            verdict,
            summary,
            issues,
        }
    }

    /// Report for an input that could not be read as a table
    pub fn structure_failure(contract: impl Into<String>, issue: Issue) -> Self {
        Self::from_issues(contract, vec![issue], 0)
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Issues with error severity
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    /// Issues referring to the given column
    pub fn issues_for_column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.column() == Some(column))
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{Issue, IssueCode, Severity};

    #[test]
    fn empty_report_passes() {
        let report = ValidationReport::from_issues("market", Vec::new(), 12);
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.rows_checked, 12);
        assert!(report.passed());
    }

    #[test]
    fn warnings_do_not_block() {
        let issues = vec![
            Issue::new(IssueCode::UnexpectedColumn, Severity::Warn, "Extra column 'notes'"),
            Issue::new(IssueCode::OutOfRange, Severity::Info, "Zero quantity"),
        ];

        let report = ValidationReport::from_issues("market", issues, 3);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.info, 1);
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[test]
    fn errors_fail_the_report() {
        let issues = vec![
            Issue::new(IssueCode::MissingColumn, Severity::Error, "Missing column"),
        ];

        let report = ValidationReport::from_issues("supplier", issues, 0);
        assert!(report.has_errors());
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn report_serialization() {
        let report = ValidationReport::from_issues("market", Vec::new(), 0);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"verdict\": \"pass\""));
        assert!(json.contains("\"issues\""));
    }
}
