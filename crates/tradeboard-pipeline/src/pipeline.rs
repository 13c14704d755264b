//! Ordered, versioned transform pipelines

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tradeboard_core::{Dataset, Fingerprint, PipelineSpec};
use crate::step::{StepError, TransformStep};
use crate::steps::build_step;

/// A step failed; the pipeline stopped there
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Step '{step}' (position {position}) failed: {source}")]
pub struct TransformError {
    pub step: String,

    /// 1-indexed position of the failing step
    pub position: usize,

    pub source: StepError,
}

/// An ordered list of transform steps with a content-derived version
///
/// The version is a SHA-256 over each step's name and parameter JSON, in
/// order. Cached results are keyed by it, so changing any step changes
/// which cache entries are reachable.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn TransformStep>>,
    version: String,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Build from the configuration form
    pub fn from_spec(name: impl Into<String>, spec: &PipelineSpec) -> Self {
        Self::new(name.into(), spec.steps.iter().map(build_step).collect())
    }

    fn new(name: String, steps: Vec<Arc<dyn TransformStep>>) -> Self {
        let version = compute_version(&steps);
        Self { name, steps, version }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Apply every step in order, halting at the first failure
    pub fn run(&self, input: Dataset) -> Result<Dataset, TransformError> {
        let started = Instant::now();
        let mut current = input;

        for (index, step) in self.steps.iter().enumerate() {
            current = step.apply(&current).map_err(|source| {
                tracing::debug!(
                    pipeline = %self.name,
                    step = step.name(),
                    position = index + 1,
                    error = %source,
                    "transform step failed"
                );
                TransformError {
                    step: step.name().to_string(),
                    position: index + 1,
                    source,
                }
            })?;
        }

        tracing::debug!(
            pipeline = %self.name,
            steps = self.steps.len(),
            rows = current.row_count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );

        Ok(current)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("version", &self.version)
            .finish()
    }
}

fn compute_version(steps: &[Arc<dyn TransformStep>]) -> String {
    let mut fp = Fingerprint::new()
        .domain("pipeline/v1")
        .u64(steps.len() as u64);

    for step in steps {
        // serde_json maps are sorted, so parameter JSON is canonical
        fp = fp.str(step.name()).str(&step.params().to_string());
    }

    fp.finish()
}

/// Incremental construction of a [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn TransformStep>>,
}

impl PipelineBuilder {
    pub fn step(mut self, step: impl TransformStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Add a step that is shared with other pipelines
    pub fn shared_step(mut self, step: Arc<dyn TransformStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.name, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{FillNulls, Scale, Sort, TrimText};
    use pretty_assertions::assert_eq;
    use tradeboard_core::{Column, StepSpec};

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Column::text("exporter", vec![Some(" Acme ".into()), None, Some("Globex".into())]),
            Column::numeric("kgs", vec![Some(20.0), Some(5.0), Some(12.0)]),
        ])
        .unwrap()
    }

    fn cleaning() -> Pipeline {
        Pipeline::builder("cleaning")
            .step(TrimText {
                columns: vec!["exporter".into()],
            })
            .step(FillNulls {
                column: "exporter".into(),
                value: "Unknown".into(),
            })
            .step(Sort {
                by: "kgs".into(),
                descending: false,
            })
            .build()
    }

    #[test]
    fn steps_run_in_order() {
        let out = cleaning().run(dataset()).unwrap();
        assert_eq!(
            out.column("exporter").unwrap().data.as_text().unwrap(),
            &[
                Some("Unknown".to_string()),
                Some("Globex".to_string()),
                Some("Acme".to_string())
            ]
        );
    }

    #[test]
    fn idempotent_pipeline_reaches_fixed_point() {
        let pipeline = cleaning();
        let once = pipeline.run(dataset()).unwrap();
        let twice = pipeline.run(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn halts_at_first_failure() {
        let pipeline = Pipeline::builder("broken")
            .step(TrimText {
                columns: vec!["exporter".into()],
            })
            .step(Scale {
                column: "missing".into(),
                factor: 2.0,
                into: "x".into(),
            })
            .step(Sort {
                by: "kgs".into(),
                descending: true,
            })
            .build();

        let err = pipeline.run(dataset()).unwrap_err();
        assert_eq!(err.step, "scale");
        assert_eq!(err.position, 2);
        assert_eq!(err.source, StepError::UnknownColumn("missing".into()));
    }

    #[test]
    fn version_is_deterministic() {
        assert_eq!(cleaning().version(), cleaning().version());
        assert_eq!(cleaning().version().len(), 64);
    }

    #[test]
    fn version_changes_with_parameters() {
        let spec = |factor: f64| PipelineSpec {
            steps: vec![StepSpec::Scale {
                column: "kgs".into(),
                factor,
                into: "tons".into(),
            }],
        };

        let a = Pipeline::from_spec("p", &spec(0.001));
        let b = Pipeline::from_spec("p", &spec(0.01));
        assert_ne!(a.version(), b.version());
    }

    #[test]
    fn version_changes_with_order() {
        let trim = StepSpec::TrimText {
            columns: vec!["exporter".into()],
        };
        let sort = StepSpec::Sort {
            by: "kgs".into(),
            descending: false,
        };

        let a = Pipeline::from_spec("p", &PipelineSpec {
            steps: vec![trim.clone(), sort.clone()],
        });
        let b = Pipeline::from_spec("p", &PipelineSpec {
            steps: vec![sort, trim],
        });
        assert_ne!(a.version(), b.version());
    }

    #[test]
    fn builder_and_spec_agree() {
        let built = Pipeline::builder("a")
            .step(Sort {
                by: "kgs".into(),
                descending: true,
            })
            .build();
        let configured = Pipeline::from_spec("b", &PipelineSpec {
            steps: vec![StepSpec::Sort {
                by: "kgs".into(),
                descending: true,
            }],
        });
        assert_eq!(built.version(), configured.version());
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = Pipeline::builder("identity").build();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run(dataset()).unwrap(), dataset());
    }
}
