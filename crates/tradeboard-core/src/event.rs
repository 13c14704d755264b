//! Structured events emitted by the data core
//!
//! The cache, validator and service report what happened as [`Event`] values
//! handed to an [`EventSink`]. Library code never decides how events are
//! rendered: [`TracingSink`] forwards them to `tracing`, [`MemorySink`]
//! collects them for inspection and [`NullSink`] drops them.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionReason {
    /// Removed to get back under the entry-count or size bound
    Capacity,

    /// Older than the configured TTL
    Expired,

    /// Removed by an explicit invalidation request
    Invalidated,

    /// Internal state was reset after a failure
    Reset,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capacity => write!(f, "capacity"),
            Self::Expired => write!(f, "expired"),
            Self::Invalidated => write!(f, "invalidated"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// A single observable occurrence in the data core
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Served from a stored entry
    CacheHit { key: String, duration: Duration },

    /// No usable entry; this caller starts the computation
    CacheMiss { key: String },

    /// A computation for the key was already running; this caller waits on it
    CacheJoined { key: String },

    /// A computed dataset was stored
    CacheStored {
        key: String,
        size: usize,
        duration: Duration,
    },

    /// An entry was removed
    CacheEvicted { key: String, reason: EvictionReason },

    /// The computation failed; nothing was stored
    ComputeFailed {
        key: String,
        duration: Duration,
        error: String,
    },

    /// A waiter gave up before the computation finished
    WaitTimedOut { key: String, waited: Duration },

    /// The input did not satisfy its contract
    ValidationFailed {
        key: String,
        contract: String,
        errors: usize,
        warnings: usize,
        duration: Duration,
    },

    /// A pipeline step failed on validated data
    TransformFailed {
        key: String,
        step: String,
        position: usize,
        message: String,
        duration: Duration,
    },
}

impl Event {
    /// Cache key the event refers to
    pub fn key(&self) -> &str {
        match self {
            Self::CacheHit { key, .. }
            | Self::CacheMiss { key }
            | Self::CacheJoined { key }
            | Self::CacheStored { key, .. }
            | Self::CacheEvicted { key, .. }
            | Self::ComputeFailed { key, .. }
            | Self::WaitTimedOut { key, .. }
            | Self::ValidationFailed { key, .. }
            | Self::TransformFailed { key, .. } => key,
        }
    }

    /// Short, stable outcome label
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::CacheHit { .. } => "hit",
            Self::CacheMiss { .. } => "miss",
            Self::CacheJoined { .. } => "joined",
            Self::CacheStored { .. } => "stored",
            Self::CacheEvicted { .. } => "evicted",
            Self::ComputeFailed { .. } => "compute_failed",
            Self::WaitTimedOut { .. } => "timeout",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::TransformFailed { .. } => "transform_failed",
        }
    }

    /// Elapsed time, where one was measured
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::CacheHit { duration, .. }
            | Self::CacheStored { duration, .. }
            | Self::ComputeFailed { duration, .. }
            | Self::ValidationFailed { duration, .. }
            | Self::TransformFailed { duration, .. } => Some(*duration),
            Self::WaitTimedOut { waited, .. } => Some(*waited),
            Self::CacheMiss { .. } | Self::CacheJoined { .. } | Self::CacheEvicted { .. } => None,
        }
    }
}

/// Receiver of core events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Forwards events to `tracing`
///
/// Failures are logged at `warn`, evictions and joins at `debug`, everything
/// else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        let key = event.key();
        let outcome = event.outcome();
        let duration_ms = event.duration().map(|d| d.as_secs_f64() * 1000.0);

        match event {
            Event::ComputeFailed { error, .. } => {
                tracing::warn!(key, outcome, duration_ms, error = %error, "dataset computation failed");
            }
            Event::WaitTimedOut { .. } => {
                tracing::warn!(key, outcome, duration_ms, "timed out waiting for dataset");
            }
            Event::ValidationFailed { contract, errors, warnings, .. } => {
                tracing::warn!(key, outcome, duration_ms, contract = %contract, errors, warnings, "input failed validation");
            }
            Event::TransformFailed { step, position, message, .. } => {
                tracing::warn!(key, outcome, duration_ms, step = %step, position, message = %message, "transform step failed");
            }
            Event::CacheEvicted { reason, .. } => {
                tracing::debug!(key, outcome, reason = %reason, "cache entry evicted");
            }
            Event::CacheJoined { .. } => {
                tracing::debug!(key, outcome, "joined in-flight computation");
            }
            Event::CacheStored { size, .. } => {
                tracing::info!(key, outcome, duration_ms, size, "dataset cached");
            }
            Event::CacheHit { .. } | Event::CacheMiss { .. } => {
                tracing::info!(key, outcome, duration_ms, "dataset lookup");
            }
        }
    }
}

/// Records events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events with the given outcome label
    pub fn count(&self, outcome: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.outcome() == outcome)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_counts_outcomes() {
        let sink = MemorySink::new();
        sink.emit(&Event::CacheMiss { key: "k1".into() });
        sink.emit(&Event::CacheHit {
            key: "k1".into(),
            duration: Duration::from_millis(1),
        });
        sink.emit(&Event::CacheHit {
            key: "k1".into(),
            duration: Duration::from_millis(2),
        });

        assert_eq!(sink.count("hit"), 2);
        assert_eq!(sink.count("miss"), 1);
        assert_eq!(sink.events()[0].key(), "k1");
    }

    #[test]
    fn event_fields() {
        let event = Event::TransformFailed {
            key: "abc".into(),
            step: "ratio".into(),
            position: 2,
            message: "division by zero".into(),
            duration: Duration::from_millis(5),
        };
        assert_eq!(event.outcome(), "transform_failed");
        assert_eq!(event.duration(), Some(Duration::from_millis(5)));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"transform_failed\""));
    }
}
