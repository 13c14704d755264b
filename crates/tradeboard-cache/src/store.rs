//! Single-flight dataset store with LRU, size and TTL bounds
//!
//! Concurrent requests for the same key share one computation. The first
//! caller registers the key as in flight and spawns the computation on the
//! tokio runtime; later callers subscribe to its result. The spawned task
//! stores the dataset, removes the key from the in-flight registry and only
//! then publishes the result, all stored-state changes happening under one
//! lock that is never held across an `.await`.
//!
//! Dropping a waiter never cancels the computation: it always runs to
//! completion and its result is stored for the next caller.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tradeboard_core::{CacheSettings, Dataset, Event, EventSink, EvictionReason, TracingSink};
use crate::key::CacheKey;

/// Why `get_or_compute` produced no dataset
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError<E> {
    /// The computation itself failed; nothing was stored
    #[error("{0}")]
    Compute(E),

    /// This caller stopped waiting; the computation continues
    #[error("Timed out after {0:?} waiting for the computation")]
    Timeout(Duration),

    /// The computation panicked or was torn down before producing a result
    #[error("Computation ended without producing a result")]
    Abandoned,
}

/// Counters and occupancy of a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on a computation started by someone else
    pub joins: u64,
    /// Entries removed for capacity or by invalidation
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub total_size: usize,
}

impl CacheStats {
    /// Fraction of requests served without starting a computation
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.joins;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.joins) as f64 / total as f64
        }
    }
}

type Published<E> = Option<Result<Arc<Dataset>, CacheError<E>>>;

const ABANDONED: &str = "Computation ended without producing a result";

struct Entry {
    dataset: Arc<Dataset>,
    size: usize,
    created_at: Instant,
    /// Position in the LRU index, bumped on every hit; larger is more recent
    seq: u64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    joins: u64,
    evictions: u64,
    expirations: u64,
}

struct State<E> {
    entries: HashMap<CacheKey, Entry>,
    lru: BTreeMap<u64, CacheKey>,
    in_flight: HashMap<CacheKey, watch::Receiver<Published<E>>>,
    next_seq: u64,
    total_size: usize,
    counters: Counters,
    /// Emitted once the lock is released
    events: Vec<Event>,
}

impl<E> State<E> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lru: BTreeMap::new(),
            in_flight: HashMap::new(),
            next_seq: 0,
            total_size: 0,
            counters: Counters::default(),
            events: Vec::new(),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Live entry for `key`, marked most recently used; expired entries are removed
    fn lookup(&mut self, key: &CacheKey, now: Instant, ttl: Duration) -> Option<Arc<Dataset>> {
        let expired = now.duration_since(self.entries.get(key)?.created_at) >= ttl;
        if expired {
            self.remove(key, EvictionReason::Expired);
            return None;
        }

        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        self.lru.remove(&entry.seq);
        self.lru.insert(seq, key.clone());
        entry.seq = seq;
        Some(Arc::clone(&entry.dataset))
    }

    fn insert(&mut self, key: CacheKey, dataset: Arc<Dataset>, size: usize, now: Instant) {
        if let Some(old) = self.entries.remove(&key) {
            self.lru.remove(&old.seq);
            self.total_size = self.total_size.saturating_sub(old.size);
        }

        let seq = self.next_seq();
        self.lru.insert(seq, key.clone());
        self.total_size += size;
        self.entries.insert(
            key,
            Entry {
                dataset,
                size,
                created_at: now,
                seq,
            },
        );
    }

    fn remove(&mut self, key: &CacheKey, reason: EvictionReason) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };

        self.lru.remove(&entry.seq);
        self.total_size = self.total_size.saturating_sub(entry.size);
        match reason {
            EvictionReason::Expired => self.counters.expirations += 1,
            _ => self.counters.evictions += 1,
        }
        self.events.push(Event::CacheEvicted {
            key: key.to_string(),
            reason,
        });
        true
    }

    /// Drop least recently used entries until both bounds hold
    fn enforce_bounds(&mut self, settings: &CacheSettings) {
        while self.entries.len() > settings.max_entries
            || self.total_size > settings.max_total_size_bytes
        {
            let Some((_, key)) = self.lru.pop_first() else {
                break;
            };
            self.remove(&key, EvictionReason::Capacity);
        }
    }

    fn is_live(&self, key: &CacheKey, now: Instant, ttl: Duration) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| now.duration_since(entry.created_at) < ttl)
    }

    /// Forget every stored entry; computations in flight are left alone
    fn reset(&mut self) {
        for key in self.entries.keys() {
            self.events.push(Event::CacheEvicted {
                key: key.to_string(),
                reason: EvictionReason::Reset,
            });
        }
        self.entries.clear();
        self.lru.clear();
        self.total_size = 0;
    }
}

struct Inner<E> {
    state: Mutex<State<E>>,
    settings: CacheSettings,
    sink: Arc<dyn EventSink>,
}

impl<E> Inner<E> {
    /// Lock the state, recovering from a panic in another holder
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            let mut state = poisoned.into_inner();
            tracing::warn!(
                entries = state.entries.len(),
                "cache state poisoned by a panic, dropping stored entries"
            );
            state.reset();
            self.state.clear_poison();
            state
        })
    }

    /// Release the lock, then emit the events recorded while holding it
    fn unlock(&self, mut state: MutexGuard<'_, State<E>>) {
        let events = std::mem::take(&mut state.events);
        drop(state);
        for event in &events {
            self.sink.emit(event);
        }
    }
}

/// Dataset cache shared by all requests of a process
///
/// ## Usage
///
/// ```rust,ignore
/// let store: CacheStore<MyError> = CacheStore::new(CacheSettings::default(), Arc::new(TracingSink));
///
/// let dataset = store
///     .get_or_compute(&key, move || async move { build_dataset(input).await })
///     .await?;
/// ```
pub struct CacheStore<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for CacheStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> CacheStore<E>
where
    E: Clone + Send + Sync + fmt::Display + 'static,
{
    pub fn new(settings: CacheSettings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new()),
                settings,
                sink,
            }),
        }
    }

    /// Store reporting events through `tracing`
    pub fn with_settings(settings: CacheSettings) -> Self {
        Self::new(settings, Arc::new(TracingSink))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Return the dataset for `key`, computing it at most once at a time
    ///
    /// A live entry is returned as an owned copy. Otherwise the caller either
    /// joins the computation already running for `key` or starts `compute`
    /// on the runtime and waits for it. Failures are shared with every
    /// current waiter but never stored.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> Result<Dataset, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Dataset, E>> + Send + 'static,
    {
        let started = Instant::now();
        let label = key.to_string();

        let (receiver, flight) = {
            let mut state = self.inner.lock();

            if let Some(dataset) = state.lookup(key, started, self.inner.settings.ttl()) {
                state.counters.hits += 1;
                state.events.push(Event::CacheHit {
                    key: label,
                    duration: started.elapsed(),
                });
                self.inner.unlock(state);
                return Ok(Dataset::clone(&dataset));
            }

            let joined = state.in_flight.get(key).cloned();
            let pending = match joined {
                Some(receiver) => {
                    state.counters.joins += 1;
                    state.events.push(Event::CacheJoined { key: label.clone() });
                    (receiver, None)
                }
                None => {
                    state.counters.misses += 1;
                    state.events.push(Event::CacheMiss { key: label.clone() });

                    let (sender, receiver) = watch::channel(None);
                    state.in_flight.insert(key.clone(), receiver.clone());
                    let flight = Flight {
                        inner: Arc::clone(&self.inner),
                        key: key.clone(),
                        sender,
                        started,
                        finished: false,
                    };
                    (receiver, Some(flight))
                }
            };

            self.inner.unlock(state);
            pending
        };

        if let Some(flight) = flight {
            tokio::spawn(flight.run(compute));
        }

        self.wait(label, receiver, started).await
    }

    async fn wait(
        &self,
        label: String,
        mut receiver: watch::Receiver<Published<E>>,
        started: Instant,
    ) -> Result<Dataset, CacheError<E>> {
        let published = async move {
            match receiver.wait_for(Option::is_some).await {
                Ok(value) => (*value).clone().unwrap_or(Err(CacheError::Abandoned)),
                // Sender gone without publishing
                Err(_) => Err(CacheError::Abandoned),
            }
        };

        let outcome = match self.inner.settings.compute_timeout() {
            Some(limit) => match tokio::time::timeout(limit, published).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.inner.sink.emit(&Event::WaitTimedOut {
                        key: label,
                        waited: started.elapsed(),
                    });
                    return Err(CacheError::Timeout(limit));
                }
            },
            None => published.await,
        };

        outcome.map(|dataset| Dataset::clone(&dataset))
    }

    /// Whether a live entry exists; does not count as an access
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner
            .lock()
            .is_live(key, Instant::now(), self.inner.settings.ttl())
    }

    /// Remove one stored entry
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.inner.lock();
        let removed = state.remove(key, EvictionReason::Invalidated);
        self.inner.unlock(state);
        removed
    }

    /// Remove every stored entry whose key matches `predicate`
    pub fn invalidate_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut state = self.inner.lock();
        let keys: Vec<CacheKey> = state.entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &keys {
            state.remove(key, EvictionReason::Invalidated);
        }
        self.inner.unlock(state);
        keys.len()
    }

    /// Remove every stored entry
    ///
    /// Computations in flight still finish and store their result.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Number of stored entries (including not yet purged expired ones)
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the estimated sizes of stored entries
    pub fn total_size(&self) -> usize {
        self.inner.lock().total_size
    }

    /// Number of computations currently running
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats {
            hits: state.counters.hits,
            misses: state.counters.misses,
            joins: state.counters.joins,
            evictions: state.counters.evictions,
            expirations: state.counters.expirations,
            entries: state.entries.len(),
            total_size: state.total_size,
        }
    }
}

impl<E> fmt::Debug for CacheStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("CacheStore")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("total_size", &state.total_size)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// One running computation
///
/// If the task is torn down before `run` completes (the computation panicked,
/// or the runtime shut down) `Drop` releases the key and tells waiters the
/// computation was abandoned.
struct Flight<E> {
    inner: Arc<Inner<E>>,
    key: CacheKey,
    sender: watch::Sender<Published<E>>,
    started: Instant,
    finished: bool,
}

impl<E> Flight<E>
where
    E: Clone + Send + Sync + fmt::Display + 'static,
{
    async fn run<F, Fut>(mut self, compute: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Dataset, E>> + Send + 'static,
    {
        let result = compute().await;
        let duration = self.started.elapsed();
        let label = self.key.to_string();

        let published = {
            let mut state = self.inner.lock();

            let published = match result {
                Ok(dataset) => {
                    let dataset = Arc::new(dataset);
                    let size = dataset.estimated_size();
                    state.insert(self.key.clone(), Arc::clone(&dataset), size, Instant::now());
                    state.events.push(Event::CacheStored {
                        key: label,
                        size,
                        duration,
                    });
                    state.enforce_bounds(&self.inner.settings);
                    Ok(dataset)
                }
                Err(error) => {
                    state.events.push(Event::ComputeFailed {
                        key: label,
                        duration,
                        error: error.to_string(),
                    });
                    Err(CacheError::Compute(error))
                }
            };

            state.in_flight.remove(&self.key);
            self.inner.unlock(state);
            published
        };

        self.finished = true;
        self.sender.send_replace(Some(published));
    }
}

impl<E> Drop for Flight<E> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::warn!(key = %self.key, "cache computation ended without a result");

        let mut state = self.inner.lock();
        state.in_flight.remove(&self.key);
        state.events.push(Event::ComputeFailed {
            key: self.key.to_string(),
            duration: self.started.elapsed(),
            error: ABANDONED.to_string(),
        });
        self.inner.unlock(state);

        self.sender.send_replace(Some(Err(CacheError::Abandoned)));
    }
}
