//! Tradeboard service - Cached dataset access for the trade dashboards
//!
//! This crate ties validation, transformation and caching together:
//! - The catalog of dataset kinds (contract + pipeline)
//! - `DatasetService::get_dataset`, the one entry point dashboards call
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tradeboard_service::{DatasetOutcome, DatasetService};
//!
//! let service = DatasetService::from_config(&config)?;
//! let input = RawInput::from_bytes(bytes, "supplier");
//!
//! match service.get_dataset(&input, "supplier").await? {
//!     DatasetOutcome::Ready(dataset) => render(dataset),
//!     DatasetOutcome::Invalid(report) => show_issues(report),
//! }
//! ```

pub mod catalog;
pub mod service;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use service::{DatasetOutcome, DatasetService, ServiceError};
