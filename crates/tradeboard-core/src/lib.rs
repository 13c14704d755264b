//! Tradeboard Core
//!
//! Core domain model for the trade analytics data core: typed datasets,
//! schema contracts, validation reports, pipeline definitions, structured
//! events and configuration.
//! Never rename issue codes - they are part of the public API.

pub mod issue;
pub mod report;
pub mod dataset;
pub mod contract;
pub mod pipeline_spec;
pub mod event;
pub mod fingerprint;
pub mod config;

pub use issue::{Issue, IssueCode, Severity, CellLocation};
pub use report::{ValidationReport, ReportSummary, ReportVersion, Verdict};
pub use dataset::{Dataset, Column, ColumnData, ColumnType, DatasetError, Value};
pub use contract::{SchemaContract, ContractDefinition, ContractBuilder, ContractError, ColumnSpec, RowRule};
pub use pipeline_spec::{PipelineSpec, StepSpec, TextCase};
pub use event::{Event, EventSink, EvictionReason, MemorySink, NullSink, TracingSink};
pub use fingerprint::{Fingerprint, sha256_hex};
pub use config::{Config, CacheSettings, ConfigError, SeverityThreshold};
