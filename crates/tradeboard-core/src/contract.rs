//! Schema contracts for dashboard datasets
//!
//! A contract is the ordered column/type/nullability declaration plus row
//! rules that an uploaded table must satisfy before it is transformed. There
//! is one contract per dataset kind (market, competitor, supplier).
//!
//! Contracts are immutable once built. A configuration reload produces a new
//! contract with a new fingerprint rather than mutating an existing one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::dataset::ColumnType;
use crate::fingerprint::Fingerprint;
use crate::issue::Severity;

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// A column declared by a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name as it appears in the header row
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether empty cells are allowed
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the column must be present in the input
    #[serde(default = "default_true")]
    pub required: bool,
}

impl ColumnSpec {
    /// Create a required, nullable column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            required: true,
        }
    }

    /// Disallow nulls
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Allow the column to be absent from the input
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Per-row rule evaluated after type coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowRule {
    /// Numeric value must be >= 0
    NonNegative {
        column: String,
        #[serde(default)]
        severity: Severity,
    },

    /// Numeric value must be a whole number
    Integer {
        column: String,
        #[serde(default)]
        severity: Severity,
    },

    /// Numeric value must lie within the inclusive bounds
    Range {
        column: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        severity: Severity,
    },

    /// Text value must match the regular expression
    Pattern {
        column: String,
        regex: String,
        #[serde(default)]
        severity: Severity,
    },

    /// Text value must be one of the listed values
    OneOf {
        column: String,
        values: Vec<String>,
        #[serde(default)]
        severity: Severity,
    },
}

impl RowRule {
    pub fn column(&self) -> &str {
        match self {
            Self::NonNegative { column, .. }
            | Self::Integer { column, .. }
            | Self::Range { column, .. }
            | Self::Pattern { column, .. }
            | Self::OneOf { column, .. } => column,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NonNegative { severity, .. }
            | Self::Integer { severity, .. }
            | Self::Range { severity, .. }
            | Self::Pattern { severity, .. }
            | Self::OneOf { severity, .. } => *severity,
        }
    }

    /// Column type the rule can be applied to
    fn applies_to(&self) -> ColumnType {
        match self {
            Self::NonNegative { .. } | Self::Integer { .. } | Self::Range { .. } => {
                ColumnType::Numeric
            }
            Self::Pattern { .. } | Self::OneOf { .. } => ColumnType::Text,
        }
    }
}

/// Serializable form of a contract, as written in `tradeboard.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    /// Declared contract version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Ordered column declarations
    pub columns: Vec<ColumnSpec>,

    /// Row rules
    #[serde(default)]
    pub rules: Vec<RowRule>,

    /// Columns that together identify a row; duplicates are reported
    #[serde(default)]
    pub key: Vec<String>,

    /// Accept input columns the contract does not declare without a warning
    #[serde(default)]
    pub allow_extra_columns: bool,
}

/// Contract construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    #[error("Contract '{0}' declares no columns")]
    Empty(String),

    #[error("Contract '{contract}' declares column '{column}' more than once")]
    DuplicateColumn { contract: String, column: String },

    #[error("Contract '{contract}' references undeclared column '{column}'")]
    UnknownColumn { contract: String, column: String },

    #[error("Contract '{contract}': rule on '{column}' requires a {expected} column, found {actual}")]
    RuleTypeMismatch {
        contract: String,
        column: String,
        expected: ColumnType,
        actual: ColumnType,
    },

    #[error("Contract '{contract}': invalid pattern for '{column}': {message}")]
    InvalidPattern {
        contract: String,
        column: String,
        message: String,
    },
}

/// A validated, immutable schema contract
#[derive(Debug, Clone)]
pub struct SchemaContract {
    name: String,
    definition: ContractDefinition,
    /// Compiled pattern per rule index (None for non-pattern rules)
    patterns: Vec<Option<Regex>>,
    fingerprint: String,
}

impl SchemaContract {
    /// Build a contract from its definition, rejecting inconsistent declarations
    pub fn new(name: impl Into<String>, definition: ContractDefinition) -> Result<Self, ContractError> {
        let name = name.into();

        if definition.columns.is_empty() {
            return Err(ContractError::Empty(name));
        }

        for (i, column) in definition.columns.iter().enumerate() {
            if definition.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ContractError::DuplicateColumn {
                    contract: name,
                    column: column.name.clone(),
                });
            }
        }

        let find = |column: &str| definition.columns.iter().find(|c| c.name == column);

        let mut patterns = Vec::with_capacity(definition.rules.len());
        for rule in &definition.rules {
            let spec = find(rule.column()).ok_or_else(|| ContractError::UnknownColumn {
                contract: name.clone(),
                column: rule.column().to_string(),
            })?;

            if spec.column_type != rule.applies_to() {
                return Err(ContractError::RuleTypeMismatch {
                    contract: name,
                    column: spec.name.clone(),
                    expected: rule.applies_to(),
                    actual: spec.column_type,
                });
            }

            let compiled = match rule {
                RowRule::Pattern { column, regex, .. } => {
                    // Anchor so the whole value has to match
                    let anchored = format!("^(?:{})$", regex);
                    let re = Regex::new(&anchored).map_err(|e| ContractError::InvalidPattern {
                        contract: name.clone(),
                        column: column.clone(),
                        message: e.to_string(),
                    })?;
                    Some(re)
                }
                _ => None,
            };
            patterns.push(compiled);
        }

        for key in &definition.key {
            if find(key).is_none() {
                return Err(ContractError::UnknownColumn {
                    contract: name,
                    column: key.clone(),
                });
            }
        }

        let canonical = serde_json::to_string(&definition).unwrap_or_default();
        let fingerprint = Fingerprint::new()
            .domain("contract/v1")
            .str(&name)
            .u64(definition.version as u64)
            .str(&canonical)
            .finish();

        Ok(Self {
            name,
            definition,
            patterns,
            fingerprint,
        })
    }

    /// Start a contract in code
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            name: name.into(),
            definition: ContractDefinition {
                version: 1,
                columns: Vec::new(),
                rules: Vec::new(),
                key: Vec::new(),
                allow_extra_columns: false,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.definition.version
    }

    /// Stable identity of this exact contract definition
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.definition.columns
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.definition.columns.iter().find(|c| c.name == name)
    }

    pub fn rules(&self) -> &[RowRule] {
        &self.definition.rules
    }

    /// Compiled pattern for the rule at `index`
    pub fn rule_pattern(&self, index: usize) -> Option<&Regex> {
        self.patterns.get(index).and_then(Option::as_ref)
    }

    pub fn key(&self) -> &[String] {
        &self.definition.key
    }

    pub fn allows_extra_columns(&self) -> bool {
        self.definition.allow_extra_columns
    }

    pub fn definition(&self) -> &ContractDefinition {
        &self.definition
    }
}

/// Fluent builder for contracts defined in code
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    name: String,
    definition: ContractDefinition,
}

impl ContractBuilder {
    pub fn version(mut self, version: u32) -> Self {
        self.definition.version = version;
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.definition.columns.push(column);
        self
    }

    pub fn rule(mut self, rule: RowRule) -> Self {
        self.definition.rules.push(rule);
        self
    }

    pub fn key(mut self, columns: &[&str]) -> Self {
        self.definition.key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn allow_extra_columns(mut self, allow: bool) -> Self {
        self.definition.allow_extra_columns = allow;
        self
    }

    pub fn build(self) -> Result<SchemaContract, ContractError> {
        SchemaContract::new(self.name, self.definition)
    }
}
