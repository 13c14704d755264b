//! The dataset service dashboards call
//!
//! One request runs: resolve the contract and pipeline for the dataset kind,
//! build the cache key, then either serve the cached dataset or validate and
//! transform the upload once (shared by concurrent callers) and store it.
//! Validation failures come back as a report, never as an error, and are
//! never cached.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tradeboard_cache::{CacheError, CacheKey, CacheStats, CacheStore};
use tradeboard_core::{CacheSettings, Config, Dataset, Event, EventSink, TracingSink, ValidationReport};
use tradeboard_pipeline::{Pipeline, TransformError};
use tradeboard_validate::{DecodeError, RawInput, ValidateError, Validator};
use crate::catalog::{Catalog, CatalogError};

/// Result of a dataset request
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetOutcome {
    /// Validated and transformed dataset, owned by the caller
    Ready(Dataset),

    /// The upload does not satisfy the contract
    Invalid(ValidationReport),
}

impl DatasetOutcome {
    pub fn dataset(&self) -> Option<&Dataset> {
        match self {
            Self::Ready(dataset) => Some(dataset),
            Self::Invalid(_) => None,
        }
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Ready(_) => None,
            Self::Invalid(report) => Some(report),
        }
    }
}

/// Errors that prevent a dataset request from producing an outcome
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Unknown dataset kind, or an invalid catalog
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The upload could not be read as text
    #[error("Unreadable input: {0}")]
    Structure(DecodeError),

    #[error("Transform failed: {0}")]
    Transform(TransformError),

    /// Waiting for the dataset took too long; retrying may succeed
    #[error("Timed out after {0:?} waiting for the dataset")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CatalogError> for ServiceError {
    fn from(error: CatalogError) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Failure of one computation, shared with every waiter on it
#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum ComputeError {
    #[error(transparent)]
    Structure(DecodeError),

    #[error("Validation against '{}' failed with {} errors", .0.contract, .0.summary.errors)]
    Invalid(Box<ValidationReport>),

    #[error(transparent)]
    Transform(TransformError),

    #[error("{0}")]
    Internal(String),
}

/// Serves validated, transformed datasets with caching
pub struct DatasetService {
    catalog: RwLock<Arc<Catalog>>,
    store: CacheStore<ComputeError>,
    validator: Validator,
    sink: Arc<dyn EventSink>,
}

impl DatasetService {
    pub fn new(catalog: Catalog, settings: CacheSettings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            store: CacheStore::new(settings, Arc::clone(&sink)),
            validator: Validator::new(),
            sink,
        }
    }

    /// Service for a loaded configuration, logging through `tracing`
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let catalog = Catalog::from_config(config)?;
        Ok(Self::new(catalog, config.cache.clone(), Arc::new(TracingSink))
            .with_validator(Validator::new().with_severity(config.severity.clone())))
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Current catalog snapshot
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a reloaded catalog
    ///
    /// Changed contracts and pipelines have new fingerprints, so entries
    /// computed with the old definitions are simply never hit again.
    pub fn replace_catalog(&self, catalog: Catalog) {
        let kinds = catalog.len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
        tracing::info!(kinds, "catalog replaced");
    }

    /// Cache key a request for `input` as `kind` would use
    pub fn key_for(&self, input: &RawInput, kind: &str) -> Result<CacheKey, ServiceError> {
        let catalog = self.catalog();
        let entry = catalog
            .resolve(kind)
            .ok_or_else(|| ServiceError::Configuration(format!("Unknown dataset kind '{}'", kind)))?;
        Ok(CacheKey::new(
            input.identity(),
            entry.contract.fingerprint(),
            entry.pipeline.version(),
        ))
    }

    /// Validated and transformed dataset for `input` as dataset kind `kind`
    pub async fn get_dataset(&self, input: &RawInput, kind: &str) -> Result<DatasetOutcome, ServiceError> {
        let catalog = self.catalog();
        let entry = catalog
            .resolve(kind)
            .ok_or_else(|| ServiceError::Configuration(format!("Unknown dataset kind '{}'", kind)))?;

        let key = CacheKey::new(
            input.identity(),
            entry.contract.fingerprint(),
            entry.pipeline.version(),
        );

        let job = Job {
            label: key.to_string(),
            input: input.clone(),
            contract: Arc::clone(&entry.contract),
            pipeline: Arc::clone(&entry.pipeline),
            validator: self.validator.clone(),
            sink: Arc::clone(&self.sink),
        };

        let compute = move || async move {
            tokio::task::spawn_blocking(move || job.run())
                .await
                .unwrap_or_else(|e| Err(ComputeError::Internal(format!("dataset computation failed: {}", e))))
        };

        match self.store.get_or_compute(&key, compute).await {
            Ok(dataset) => Ok(DatasetOutcome::Ready(dataset)),
            Err(CacheError::Compute(ComputeError::Invalid(report))) => Ok(DatasetOutcome::Invalid(*report)),
            Err(CacheError::Compute(ComputeError::Structure(e))) => Err(ServiceError::Structure(e)),
            Err(CacheError::Compute(ComputeError::Transform(e))) => Err(ServiceError::Transform(e)),
            Err(CacheError::Compute(ComputeError::Internal(message))) => Err(ServiceError::Internal(message)),
            Err(CacheError::Timeout(waited)) => Err(ServiceError::Timeout(waited)),
            Err(CacheError::Abandoned) => Err(ServiceError::Internal(
                "dataset computation ended without a result".to_string(),
            )),
        }
    }

    /// Drop every cached dataset computed from the input with `identity`
    pub fn evict_input(&self, identity: &str) -> usize {
        self.store.invalidate_where(|key| key.input() == identity)
    }

    pub fn invalidate_all(&self) -> usize {
        self.store.invalidate_all()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }
}

impl std::fmt::Debug for DatasetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetService")
            .field("kinds", &self.catalog().names().collect::<Vec<_>>())
            .field("store", &self.store)
            .finish()
    }
}

/// Everything one computation needs, moved onto a blocking thread
struct Job {
    label: String,
    input: RawInput,
    contract: Arc<tradeboard_core::SchemaContract>,
    pipeline: Arc<Pipeline>,
    validator: Validator,
    sink: Arc<dyn EventSink>,
}

impl Job {
    fn run(self) -> Result<Dataset, ComputeError> {
        let started = Instant::now();

        let checked = match self.validator.check(&self.input, &self.contract) {
            Ok(checked) => checked,
            Err(ValidateError::Decode(e)) => return Err(ComputeError::Structure(e)),
            Err(ValidateError::Materialize(e)) => return Err(ComputeError::Internal(e.to_string())),
        };

        let Some(dataset) = checked.dataset else {
            let report = checked.report;
            self.sink.emit(&Event::ValidationFailed {
                key: self.label,
                contract: report.contract.clone(),
                errors: report.summary.errors,
                warnings: report.summary.warnings,
                duration: started.elapsed(),
            });
            return Err(ComputeError::Invalid(Box::new(report)));
        };

        self.pipeline.run(dataset).map_err(|e| {
            self.sink.emit(&Event::TransformFailed {
                key: self.label.clone(),
                step: e.step.clone(),
                position: e.position,
                message: e.source.to_string(),
                duration: started.elapsed(),
            });
            ComputeError::Transform(e)
        })
    }
}
