//! Dataset caching with single-flight computation
//!
//! This crate keeps processed datasets in memory so that repeated requests
//! for the same upload, contract and pipeline are served without redoing the
//! work.
//!
//! ## Architecture
//!
//! - **Keys**: input identity + contract fingerprint + pipeline version
//! - **Single flight**: one computation per key at a time, shared by all waiters
//! - **Bounds**: entry count, total estimated size, TTL; LRU eviction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tradeboard_cache::{CacheKey, CacheStore};
//!
//! let store: CacheStore<String> = CacheStore::with_settings(CacheSettings::default());
//! let key = CacheKey::new(input.identity(), contract.fingerprint(), pipeline.version());
//!
//! // Computed once, then served from memory
//! let dataset = store.get_or_compute(&key, move || async move { compute(input) }).await?;
//! ```

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheError, CacheStats, CacheStore};
