//! Contract and pipeline catalog
//!
//! The catalog maps a dataset kind ("market", "competitor", "supplier", ...)
//! to the contract uploads of that kind are validated against and the
//! pipeline that prepares them for the dashboards.

use std::collections::BTreeMap;
use std::sync::Arc;
use tradeboard_core::{
    ColumnSpec, ColumnType, Config, ContractError, PipelineSpec, RowRule, SchemaContract,
    Severity, StepSpec, TextCase,
};
use tradeboard_pipeline::Pipeline;

/// Errors building a catalog from configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid contract '{name}': {source}")]
    Contract {
        name: String,
        #[source]
        source: ContractError,
    },

    #[error("Pipeline '{0}' has no contract of the same name")]
    OrphanPipeline(String),
}

/// Contract plus pipeline for one dataset kind
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub contract: Arc<SchemaContract>,
    pub pipeline: Arc<Pipeline>,
}

/// Dataset kinds known to the service
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry named after `contract`
    pub fn with(mut self, contract: SchemaContract, pipeline: Pipeline) -> Self {
        self.insert(contract, pipeline);
        self
    }

    pub fn insert(&mut self, contract: SchemaContract, pipeline: Pipeline) -> Option<CatalogEntry> {
        self.entries.insert(
            contract.name().to_string(),
            CatalogEntry {
                contract: Arc::new(contract),
                pipeline: Arc::new(pipeline),
            },
        )
    }

    pub fn resolve(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    /// Dataset kinds in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Built-in catalog plus the contracts and pipelines from `config`
    ///
    /// A configured contract replaces the built-in one of the same name and
    /// runs the configured pipeline of that name, or no steps if none is
    /// configured. A configured pipeline alone replaces the pipeline of an
    /// existing kind.
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        let mut catalog = Self::builtin()?;

        for (name, definition) in &config.contracts {
            let contract = SchemaContract::new(name.clone(), definition.clone()).map_err(|source| {
                CatalogError::Contract {
                    name: name.clone(),
                    source,
                }
            })?;
            let spec = config.pipelines.get(name).cloned().unwrap_or_default();
            catalog.insert(contract, Pipeline::from_spec(name.clone(), &spec));
        }

        for (name, spec) in &config.pipelines {
            if config.contracts.contains_key(name) {
                continue;
            }
            let entry = catalog
                .entries
                .get_mut(name)
                .ok_or_else(|| CatalogError::OrphanPipeline(name.clone()))?;
            entry.pipeline = Arc::new(Pipeline::from_spec(name.clone(), spec));
        }

        tracing::debug!(kinds = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// The trade dashboards' dataset kinds
    ///
    /// All three share the shipment columns of the customs export files and
    /// differ in how the pipeline prepares them:
    /// - `market`: time series ordered by period
    /// - `competitor`: shipments ordered by weight, heaviest first
    /// - `supplier`: weight in tons derived from kilograms, heaviest first
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();

        let market = PipelineSpec {
            steps: [
                cleaning_steps(),
                vec![StepSpec::Sort {
                    by: "Period".into(),
                    descending: false,
                }],
            ]
            .concat(),
        };

        let competitor = PipelineSpec {
            steps: [
                cleaning_steps(),
                vec![StepSpec::Sort {
                    by: "Kgs".into(),
                    descending: true,
                }],
            ]
            .concat(),
        };

        let supplier = PipelineSpec {
            steps: [
                cleaning_steps(),
                vec![
                    StepSpec::Scale {
                        column: "Kgs".into(),
                        factor: 0.001,
                        into: "Tons".into(),
                    },
                    StepSpec::Sort {
                        by: "Kgs".into(),
                        descending: true,
                    },
                ],
            ]
            .concat(),
        };

        for (name, spec) in [("market", market), ("competitor", competitor), ("supplier", supplier)] {
            let contract = shipment_contract(name).map_err(|source| CatalogError::Contract {
                name: name.to_string(),
                source,
            })?;
            catalog.insert(contract, Pipeline::from_spec(name, &spec));
        }

        Ok(catalog)
    }
}

/// Month names, abbreviations and numbers the `month_number` step understands
const MONTH_PATTERN: &str = "(?i)jan(uary)?|feb(ruary)?|mar(ch)?|apr(il)?|may|june?|july?|aug(ust)?|sep(t|tember)?|oct(ober)?|nov(ember)?|dec(ember)?|0?[1-9]|1[0-2]";

/// Columns of the customs shipment exports
fn shipment_contract(name: &str) -> Result<SchemaContract, ContractError> {
    SchemaContract::builder(name)
        .column(ColumnSpec::new("Consignee", ColumnType::Text).not_null())
        .column(ColumnSpec::new("Exporter", ColumnType::Text).not_null())
        .column(ColumnSpec::new("Kgs", ColumnType::Numeric).not_null())
        .column(ColumnSpec::new("Tons", ColumnType::Numeric).optional())
        .column(ColumnSpec::new("Month", ColumnType::Text).not_null())
        .column(ColumnSpec::new("Year", ColumnType::Numeric).not_null())
        .column(ColumnSpec::new("Consignee State", ColumnType::Text).optional())
        .column(ColumnSpec::new("Job No.", ColumnType::Text).optional())
        .column(ColumnSpec::new("Mark", ColumnType::Text).optional())
        .column(ColumnSpec::new("Partner", ColumnType::Text).optional())
        .rule(RowRule::NonNegative {
            column: "Kgs".into(),
            severity: Severity::Error,
        })
        .rule(RowRule::NonNegative {
            column: "Tons".into(),
            severity: Severity::Error,
        })
        .rule(RowRule::Integer {
            column: "Year".into(),
            severity: Severity::Error,
        })
        .rule(RowRule::Range {
            column: "Year".into(),
            min: Some(1900.0),
            max: Some(2100.0),
            severity: Severity::Error,
        })
        .rule(RowRule::Pattern {
            column: "Month".into(),
            regex: MONTH_PATTERN.into(),
            severity: Severity::Error,
        })
        .allow_extra_columns(true)
        .build()
}

/// Shared cleaning: tidy names, fill unknown states, derive month number and period
fn cleaning_steps() -> Vec<StepSpec> {
    vec![
        StepSpec::TrimText {
            columns: vec!["Consignee".into(), "Exporter".into(), "Consignee State".into()],
        },
        StepSpec::FillNulls {
            column: "Consignee State".into(),
            value: "Unknown".into(),
        },
        StepSpec::NormalizeCase {
            column: "Consignee State".into(),
            case: TextCase::Title,
        },
        StepSpec::MonthNumber {
            column: "Month".into(),
            into: "Month No".into(),
        },
        StepSpec::Period {
            month: "Month No".into(),
            year: "Year".into(),
            into: "Period".into(),
        },
    ]
}
