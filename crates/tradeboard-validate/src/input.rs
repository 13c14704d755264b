//! Raw uploaded input

use std::sync::Arc;
use tradeboard_core::sha256_hex;

/// An uploaded table as handed over by the file-handling layer
///
/// The bytes are shared, not copied, between the caller and any in-flight
/// computation. The identity is what the cache is keyed by: two inputs with
/// the same identity are assumed to hold the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    identity: String,
    bytes: Arc<[u8]>,
    schema_name: String,
}

impl RawInput {
    /// Wrap bytes with a caller-supplied identity (file fingerprint, upload id, ...)
    pub fn new(
        identity: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        schema_name: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            bytes: bytes.into(),
            schema_name: schema_name.into(),
        }
    }

    /// Wrap bytes, deriving the identity from their SHA-256
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, schema_name: impl Into<String>) -> Self {
        let bytes = bytes.into();
        let identity = format!("sha256:{}", sha256_hex(&bytes));
        Self {
            identity,
            bytes,
            schema_name: schema_name.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Contract name the uploader declared for this input
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
