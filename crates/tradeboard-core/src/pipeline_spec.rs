//! Serializable pipeline definitions
//!
//! These are the configuration form of transform pipelines. The executable
//! steps live in `tradeboard-pipeline`, which builds them from a
//! [`PipelineSpec`]. Field order here is part of the pipeline version
//! fingerprint, so do not reorder fields of existing variants.

use serde::{Deserialize, Serialize};

/// Letter case applied by `normalize_case`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextCase {
    Upper,
    Lower,
    Title,
}

/// One transform step with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    /// Trim surrounding whitespace and collapse internal runs in text columns
    TrimText { columns: Vec<String> },

    /// Change letter case of a text column
    NormalizeCase { column: String, case: TextCase },

    /// Replace nulls in a text column with a constant
    FillNulls { column: String, value: String },

    /// Rename a column
    Rename { from: String, to: String },

    /// Remove columns
    DropColumns { columns: Vec<String> },

    /// Multiply a numeric column by a constant into `into`
    Scale { column: String, factor: f64, into: String },

    /// Divide one numeric column by another into `into`
    Ratio {
        numerator: String,
        denominator: String,
        into: String,
    },

    /// Map month names ("Jan", "Sept", "March") to 1..=12
    MonthNumber { column: String, into: String },

    /// First day of the month from a month number and a year
    Period {
        month: String,
        year: String,
        into: String,
    },

    /// Keep only rows whose text value is in `values`
    FilterIn { column: String, values: Vec<String> },

    /// Stable sort by one column; nulls sort last
    Sort {
        by: String,
        #[serde(default)]
        descending: bool,
    },
}

impl StepSpec {
    /// Step name as used in error messages and version fingerprints
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrimText { .. } => "trim_text",
            Self::NormalizeCase { .. } => "normalize_case",
            Self::FillNulls { .. } => "fill_nulls",
            Self::Rename { .. } => "rename",
            Self::DropColumns { .. } => "drop_columns",
            Self::Scale { .. } => "scale",
            Self::Ratio { .. } => "ratio",
            Self::MonthNumber { .. } => "month_number",
            Self::Period { .. } => "period",
            Self::FilterIn { .. } => "filter_in",
            Self::Sort { .. } => "sort",
        }
    }
}

/// Ordered steps of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_from_toml() {
        let spec: PipelineSpec = toml::from_str(
            r#"
            [[steps]]
            kind = "trim_text"
            columns = ["exporter"]

            [[steps]]
            kind = "scale"
            column = "kgs"
            factor = 0.001
            into = "tons"

            [[steps]]
            kind = "sort"
            by = "tons"
            descending = true
            "#,
        )
        .unwrap();

        assert_eq!(spec.steps.len(), 3);
        assert_eq!(spec.steps[1].name(), "scale");
        assert_eq!(
            spec.steps[2],
            StepSpec::Sort {
                by: "tons".into(),
                descending: true
            }
        );
    }
}
