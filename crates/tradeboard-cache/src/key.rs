//! Cache keys

use std::fmt;
use tradeboard_core::Fingerprint;

/// Identifies one processed dataset
///
/// A key combines the input identity with the fingerprint of the contract it
/// was validated against and the version of the pipeline it was transformed
/// by. Editing either definition yields a new key, so stale results are never
/// looked up again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    input: String,
    contract: String,
    pipeline: String,
}

impl CacheKey {
    pub fn new(
        input: impl Into<String>,
        contract_fingerprint: impl Into<String>,
        pipeline_version: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            contract: contract_fingerprint.into(),
            pipeline: pipeline_version.into(),
        }
    }

    /// Identity of the raw input
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// SHA-256 over all three parts
    pub fn digest(&self) -> String {
        Fingerprint::new()
            .domain("cache-key/v1")
            .str(&self.input)
            .str(&self.contract)
            .str(&self.pipeline)
            .finish()
    }
}

/// Format: "input@contract/pipeline" with both hashes shortened to 12 chars
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.input,
            short(&self.contract),
            short(&self.pipeline)
        )
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
