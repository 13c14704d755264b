//! Tradeboard pipeline - Deterministic dataset transforms
//!
//! This crate turns validated datasets into dashboard-ready datasets:
//! - The `TransformStep` abstraction
//! - Built-in cleaning and derivation steps
//! - Versioned pipelines built from configuration

pub mod pipeline;
pub mod step;
pub mod steps;

pub use pipeline::{Pipeline, PipelineBuilder, TransformError};
pub use step::{StepError, TransformStep};
pub use steps::build_step;
