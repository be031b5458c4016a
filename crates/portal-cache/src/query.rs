//! The query cache service.
//!
//! [`QueryCache`] sits in front of every backend read:
//!
//! - a fresh entry is served without a network call
//! - a request for a key that already has a fetch in flight joins that fetch
//!   instead of issuing another one
//! - every fetch carries a per-key sequence number and a response is applied
//!   only if it is newer than the last applied one
//! - reads retry once, mutations never
//!
//! The cache is an explicit service object. Clones share the same state, so
//! it can be handed to every consumer and to background prefetch tasks.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use portal_core::{CacheKey, Clock, Freshness, PortalError, Query, Result, SnapshotStore, SystemClock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

use crate::{
    config::CacheConfig,
    entry::{CacheEntry, EntryState, QueryView},
    noop::NoopStore,
    snapshot::{PersistedEntry, PersistedSnapshot, Persister},
};

type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

/// How a caller reaches the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Serve fresh data, otherwise fetch.
    Query,
    /// Fetch even if fresh.
    Refetch,
    /// Warm the cache; failures stay invisible.
    Prefetch,
}

/// A fetch currently running for a key.
struct InFlight {
    seq: u64,
    fetch: SharedFetch,
    /// Set once a non-prefetch caller waits on this fetch.
    observed: Arc<AtomicBool>,
}

#[derive(Default)]
struct Slot {
    data: Option<Value>,
    fetched_at: Option<DateTime<Utc>>,
    stale_at: Option<DateTime<Utc>>,
    error: Option<PortalError>,
    invalidated: bool,
    applied_seq: u64,
    in_flight: Option<InFlight>,
}

impl Slot {
    fn fresh_data(&self, freshness: Freshness, clock: &dyn Clock) -> Option<Value> {
        if self.invalidated {
            return None;
        }
        let fetched_at = self.fetched_at?;
        let data = self.data.as_ref()?;
        freshness
            .is_fresh(fetched_at, clock)
            .then(|| data.clone())
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.invalidated || self.stale_at.is_none_or(|stale_at| now >= stale_at)
    }

    fn state(&self, now: DateTime<Utc>) -> EntryState {
        if self.in_flight.is_some() {
            EntryState::Fetching
        } else if self.error.is_some() {
            EntryState::Error
        } else if self.is_stale(now) {
            EntryState::Stale
        } else {
            EntryState::Fresh
        }
    }

    fn persisted(&self, key: &CacheKey) -> Option<PersistedEntry> {
        Some(PersistedEntry {
            key: key.clone(),
            data: self.data.clone()?,
            fetched_at: self.fetched_at?,
            stale_at: self.stale_at?,
            invalidated: self.invalidated,
        })
    }
}

/// Detaches a prefetch-started fetch if the prefetch is dropped before the
/// fetch completes and no query has joined it.
struct AbandonOnDrop {
    inner: Weak<Inner>,
    key: CacheKey,
    seq: u64,
    armed: bool,
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let detached = {
            let mut state = inner.lock();
            let Some(slot) = state.slots.get_mut(&self.key) else {
                return;
            };
            let unobserved = slot.in_flight.as_ref().is_some_and(|f| {
                f.seq == self.seq && !f.observed.load(Ordering::SeqCst)
            });
            if !unobserved {
                return;
            }
            let detached = slot.in_flight.take();
            if slot.data.is_none() && slot.error.is_none() {
                state.slots.remove(&self.key);
            }
            detached
        };
        debug!(key = %self.key, seq = self.seq, "Prefetch cancelled");
        drop(detached);
    }
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    next_seq: u64,
    generation: u64,
}

struct Inner {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    persister: Persister,
    state: Mutex<CacheState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds the snapshot to write after a mutation, under the state lock.
    fn snapshot(&self, state: &mut CacheState) -> (u64, PersistedSnapshot) {
        state.generation += 1;
        let entries = state
            .slots
            .iter()
            .filter(|(key, _)| self.persister.should_persist(key))
            .filter_map(|(key, slot)| slot.persisted(key));
        let snapshot = self.persister.snapshot(entries, self.clock.now());
        (state.generation, snapshot)
    }

    /// Applies the outcome of fetch `seq` for `key`.
    fn complete(
        &self,
        key: &CacheKey,
        seq: u64,
        freshness: Freshness,
        outcome: &Result<Value>,
        observed: bool,
    ) {
        let pending = {
            let mut state = self.lock();
            let Some(slot) = state.slots.get_mut(key) else {
                debug!(key = %key, seq, "Entry removed while fetching, dropping response");
                return;
            };

            if slot.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
                slot.in_flight = None;
            }

            if seq <= slot.applied_seq {
                debug!(
                    key = %key,
                    seq,
                    applied = slot.applied_seq,
                    "Discarding superseded response"
                );
                return;
            }

            let persist = match outcome {
                Ok(data) => {
                    let now = self.clock.now();
                    slot.data = Some(data.clone());
                    slot.fetched_at = Some(now);
                    slot.stale_at = Some(freshness.stale_at(now, self.clock.as_ref()));
                    slot.error = None;
                    slot.invalidated = false;
                    slot.applied_seq = seq;
                    trace!(key = %key, seq, "Stored response");
                    self.persister.should_persist(key)
                }
                Err(e) if observed => {
                    warn!(key = %key, error = %e, "Query failed");
                    slot.error = Some(e.clone());
                    false
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Prefetch failed, entry left untouched");
                    if slot.data.is_none() && slot.error.is_none() && slot.in_flight.is_none() {
                        state.slots.remove(key);
                    }
                    false
                }
            };
            persist.then(|| self.snapshot(&mut state))
        };

        if let Some((generation, snapshot)) = pending {
            self.persister.persist(generation, &snapshot);
        }
    }

    fn hydrate(&self) -> usize {
        let Some(snapshot) = self.persister.restore(self.clock.now()) else {
            return 0;
        };
        let mut state = self.lock();
        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            state.slots.insert(
                entry.key,
                Slot {
                    data: Some(entry.data),
                    fetched_at: Some(entry.fetched_at),
                    stale_at: Some(entry.stale_at),
                    invalidated: entry.invalidated,
                    ..Slot::default()
                },
            );
        }
        count
    }
}

/// Request-deduplicating, freshness-aware cache in front of backend reads.
///
/// # Example
///
/// ```rust,ignore
/// use portal_cache::{CacheConfig, QueryCache};
/// use portal_core::{Query, QueryFamily, cache_key};
///
/// let cache = QueryCache::in_memory(CacheConfig::default());
/// let query = Query::for_family(cache_key!["logements", 42], QueryFamily::Batch, &Default::default());
/// let logement = cache.query(&query, move || api.logement(42)).await?;
/// ```
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("QueryCache")
            .field("entries", &state.slots.len())
            .field(
                "in_flight",
                &state.slots.values().filter(|s| s.in_flight.is_some()).count(),
            )
            .field("clock", &self.inner.clock)
            .field("persister", &self.inner.persister)
            .finish()
    }
}

impl QueryCache {
    /// Create a cache persisting to `store`, restoring its snapshot first.
    #[must_use]
    pub fn new(config: CacheConfig, store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>) -> Self {
        let persister = Persister::new(store, &config);
        let inner = Arc::new(Inner {
            config,
            clock,
            persister,
            state: Mutex::new(CacheState::default()),
        });
        let restored = inner.hydrate();
        debug!(restored, "Query cache ready");
        Self { inner }
    }

    /// Create a cache that persists nothing, on the system clock.
    #[must_use]
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(NoopStore::new()), Arc::new(SystemClock::new()))
    }

    /// Returns the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the clock used for freshness.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Returns the value for `query`, fetching it only when needed.
    ///
    /// Fresh data is served directly; otherwise the call joins an in-flight
    /// fetch for the same key or starts one with `fetcher`, retried once on
    /// failure.
    ///
    /// # Errors
    /// Returns the fetch error when no fresh value exists and the fetch fails.
    /// The error is also recorded on the entry (see [`view`](Self::view)).
    pub async fn query<F, Fut>(&self, query: &Query, fetcher: F) -> Result<Value>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.run(query, fetcher, Mode::Query).await
    }

    /// Fetches `query` even if a fresh value exists.
    ///
    /// Still joins a fetch already in flight for the same key.
    ///
    /// # Errors
    /// Returns the fetch error.
    pub async fn refetch<F, Fut>(&self, query: &Query, fetcher: F) -> Result<Value>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.run(query, fetcher, Mode::Refetch).await
    }

    /// Warms the entry for `query` if it is not fresh.
    ///
    /// A failed prefetch never records an error on the entry. Dropping the
    /// returned future cancels the fetch it started, unless a query has
    /// joined it meanwhile.
    ///
    /// # Errors
    /// Returns the fetch error so the caller can log it; it is never stored.
    pub async fn prefetch<F, Fut>(&self, query: &Query, fetcher: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.run(query, fetcher, Mode::Prefetch).await.map(|_| ())
    }

    /// Runs a mutation exactly once, then invalidates `invalidates` on success.
    ///
    /// # Errors
    /// Returns the mutation error; nothing is invalidated in that case.
    pub async fn mutate<F, Fut>(&self, mutation: F, invalidates: &[CacheKey]) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let result = mutation().await;
        match &result {
            Ok(_) => {
                for prefix in invalidates {
                    self.invalidate(prefix);
                }
            }
            Err(e) => warn!(error = %e, "Mutation failed"),
        }
        result
    }

    #[instrument(skip_all, fields(key = %query.key, mode = ?mode))]
    async fn run<F, Fut>(&self, query: &Query, fetcher: F, mode: Mode) -> Result<Value>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let (fetch, abandon) = {
            let mut guard = self.inner.lock();
            let CacheState {
                slots, next_seq, ..
            } = &mut *guard;
            let slot = slots.entry(query.key.clone()).or_default();

            if mode != Mode::Refetch {
                if let Some(data) = slot.fresh_data(query.freshness, self.inner.clock.as_ref()) {
                    trace!("Cache hit");
                    return Ok(data);
                }
            }

            match &slot.in_flight {
                Some(in_flight) => {
                    if mode != Mode::Prefetch {
                        in_flight.observed.store(true, Ordering::SeqCst);
                    }
                    debug!(seq = in_flight.seq, "Joining in-flight fetch");
                    (in_flight.fetch.clone(), None)
                }
                None => {
                    *next_seq += 1;
                    let seq = *next_seq;
                    let observed = Arc::new(AtomicBool::new(mode != Mode::Prefetch));
                    let fetch = self.spawn_fetch(query, seq, Arc::clone(&observed), fetcher);
                    debug!(seq, "Starting fetch");
                    slot.in_flight = Some(InFlight {
                        seq,
                        fetch: fetch.clone(),
                        observed,
                    });
                    let abandon = (mode == Mode::Prefetch).then(|| AbandonOnDrop {
                        inner: Arc::downgrade(&self.inner),
                        key: query.key.clone(),
                        seq,
                        armed: true,
                    });
                    (fetch, abandon)
                }
            }
        };

        let outcome = fetch.await;
        if let Some(mut abandon) = abandon {
            abandon.armed = false;
        }
        outcome
    }

    fn spawn_fetch<F, Fut>(
        &self,
        query: &Query,
        seq: u64,
        observed: Arc<AtomicBool>,
        fetcher: F,
    ) -> SharedFetch
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let key = query.key.clone();
        let freshness = query.freshness;
        let retries = self.inner.config.query_retries;
        let delay = self.inner.config.retry_delay;

        async move {
            let outcome = fetch_with_retry(&fetcher, retries, delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.complete(&key, seq, freshness, &outcome, observed.load(Ordering::SeqCst));
            }
            outcome
        }
        .boxed()
        .shared()
    }

    /// Stores `data` for `key` directly, as if it had just been fetched.
    ///
    /// Any fetch in flight for the key is superseded.
    pub fn set_data(&self, key: &CacheKey, data: Value, freshness: Freshness) {
        let pending = {
            let mut state = self.inner.lock();
            state.next_seq += 1;
            let seq = state.next_seq;
            let now = self.inner.clock.now();
            let stale_at = freshness.stale_at(now, self.inner.clock.as_ref());

            let slot = state.slots.entry(key.clone()).or_default();
            slot.data = Some(data);
            slot.fetched_at = Some(now);
            slot.stale_at = Some(stale_at);
            slot.error = None;
            slot.invalidated = false;
            slot.applied_seq = seq;
            slot.in_flight = None;

            self.inner
                .persister
                .should_persist(key)
                .then(|| self.inner.snapshot(&mut state))
        };

        if let Some((generation, snapshot)) = pending {
            self.inner.persister.persist(generation, &snapshot);
        }
    }

    /// Marks every entry under `prefix` as stale.
    ///
    /// Fetches in flight for those keys are detached and their responses
    /// discarded, so the next read starts a new fetch. Returns the number of
    /// entries invalidated.
    pub fn invalidate(&self, prefix: &CacheKey) -> usize {
        let (count, pending) = {
            let mut guard = self.inner.lock();
            let CacheState {
                slots, next_seq, ..
            } = &mut *guard;

            let mut count = 0;
            let mut persisted = false;
            for (key, slot) in slots.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
                slot.invalidated = true;
                slot.in_flight = None;
                slot.applied_seq = *next_seq;
                persisted |= slot.data.is_some() && self.inner.persister.should_persist(key);
                count += 1;
            }
            let pending = persisted.then(|| self.inner.snapshot(&mut guard));
            (count, pending)
        };

        debug!(prefix = %prefix, count, "Invalidated entries");
        if let Some((generation, snapshot)) = pending {
            self.inner.persister.persist(generation, &snapshot);
        }
        count
    }

    /// Removes the entry for `key`. Returns true if it existed.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let (removed, pending) = {
            let mut state = self.inner.lock();
            let removed = state.slots.remove(key).is_some();
            let pending = (removed && self.inner.persister.should_persist(key))
                .then(|| self.inner.snapshot(&mut state));
            (removed, pending)
        };

        if let Some((generation, snapshot)) = pending {
            self.inner.persister.persist(generation, &snapshot);
        }
        removed
    }

    /// Removes every entry, including the persisted ones.
    pub fn clear(&self) {
        let (generation, snapshot) = {
            let mut state = self.inner.lock();
            state.slots.clear();
            self.inner.snapshot(&mut state)
        };
        self.inner.persister.persist(generation, &snapshot);
        debug!("Cleared query cache");
    }

    /// Returns a copy of the entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.inner.clock.now();
        let state = self.inner.lock();
        state.slots.get(key).map(|slot| CacheEntry {
            key: key.clone(),
            data: slot.data.clone(),
            fetched_at: slot.fetched_at,
            stale_at: slot.stale_at,
            state: slot.state(now),
        })
    }

    /// Returns what a consumer should render for `query`.
    #[must_use]
    pub fn view(&self, query: &Query) -> QueryView {
        let state = self.inner.lock();
        let Some(slot) = state.slots.get(&query.key) else {
            return QueryView::default();
        };
        QueryView {
            data: slot.data.clone(),
            error: slot.error.clone(),
            is_stale: slot
                .fresh_data(query.freshness, self.inner.clock.as_ref())
                .is_none(),
            is_fetching: slot.in_flight.is_some(),
            fetched_at: slot.fetched_at,
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calls `fetcher`, retrying up to `retries` times after a failure.
async fn fetch_with_retry<F, Fut>(fetcher: &F, retries: u32, delay: Duration) -> Result<Value>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries => {
                attempt += 1;
                debug!(error = %e, attempt, "Fetch failed, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::{FixedOffset, TimeDelta};
    use futures::future::join_all;
    use portal_core::{ManualClock, QueryFamily, cache_key};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn config() -> CacheConfig {
        CacheConfig::default().with_retry(1, Duration::ZERO)
    }

    fn batch(key: CacheKey) -> Query {
        Query::new(key, Freshness::UntilMidnight)
    }

    fn cache_at(now: &str, store: Arc<MemoryStore>) -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::utc(at(now)));
        let cache = QueryCache::new(config(), store, clock.clone());
        (cache, clock)
    }

    /// Fetcher counting its calls and answering `value` after a short pause.
    fn counting(
        calls: &Arc<AtomicUsize>,
        value: Value,
    ) -> impl Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            let value = value.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing(
        calls: &Arc<AtomicUsize>,
        error: PortalError,
    ) -> impl Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            let error = error.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(error)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_one_fetch() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["logements", 7]);

        let results = join_all(
            (0..5).map(|_| cache.query(&query, counting(&calls, json!({ "pk": 7 })))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), json!({ "pk": 7 }));
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_from_cache() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));

        // Number and numeric-string keys address the same entry
        let first = batch(cache_key!["logements", 7]);
        let second = batch(cache_key!["logements", "7"]);
        cache.query(&first, counting(&calls, json!(1))).await.unwrap();
        let again = cache.query(&second, counting(&calls, json!(2))).await.unwrap();

        assert_eq!(again, json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.entry(&first.key).unwrap().state,
            EntryState::Fresh
        );
    }

    #[tokio::test]
    async fn test_batch_entry_expires_at_local_midnight() {
        let store = Arc::new(MemoryStore::new());
        let (cache, clock) = cache_at("2024-05-01T23:59:00Z", store);
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["immeubles"]);

        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        clock.set(at("2024-05-02T00:01:00Z"));
        assert_eq!(cache.entry(&query.key).unwrap().state, EntryState::Stale);
        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Fetched at 00:01, still fresh late in the evening
        clock.set(at("2024-05-02T23:58:00Z"));
        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        clock.set(at("2024-05-03T00:00:01Z"));
        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_midnight_follows_the_local_offset() {
        let paris = FixedOffset::east_opt(2 * 3600).unwrap();
        let clock = Arc::new(ManualClock::new(at("2024-05-01T21:30:00Z"), paris));
        let cache = QueryCache::new(config(), Arc::new(NoopStore::new()), clock.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["factures"]);

        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        // 22:01 UTC is 00:01 local
        clock.set(at("2024-05-01T22:01:00Z"));
        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rolling_window_family() {
        let store = Arc::new(MemoryStore::new());
        let (cache, clock) = cache_at("2024-05-01T10:00:00Z", store);
        let calls = Arc::new(AtomicUsize::new(0));
        let query = Query::for_family(
            cache_key!["logements", 1, "interventions"],
            QueryFamily::Operational,
            &cache.config().windows,
        );

        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        clock.advance(TimeDelta::seconds(60));
        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(TimeDelta::seconds(61));
        cache.query(&query, counting(&calls, json!([]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refetch_bypasses_freshness_but_dedups() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["dashboard"]);

        let (a, b) = tokio::join!(
            cache.query(&query, counting(&calls, json!(1))),
            cache.refetch(&query, counting(&calls, json!(2))),
        );
        assert_eq!(a.unwrap(), json!(1));
        assert_eq!(b.unwrap(), json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let refreshed = cache.refetch(&query, counting(&calls, json!(3))).await.unwrap();
        assert_eq!(refreshed, json!(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reads_retry_once() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["parc"]);

        let flaky = {
            let calls = Arc::clone(&calls);
            move || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(PortalError::Network("reset".to_string()))
                    } else {
                        Ok(json!({ "compteurs": 12 }))
                    }
                }
            }
        };
        assert_eq!(cache.query(&query, flaky).await.unwrap(), json!({ "compteurs": 12 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let broken = Arc::new(AtomicUsize::new(0));
        let other = batch(cache_key!["gestion-parc"]);
        let err = cache
            .query(&other, failing(&broken, PortalError::http(500)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(broken.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mutations_run_once_and_invalidate() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let tickets = Query::new(cache_key!["tickets"], Freshness::For(Duration::from_secs(120)));
        cache.query(&tickets, counting(&calls, json!([]))).await.unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let failed = {
            let attempts = Arc::clone(&attempts);
            cache
                .mutate(
                    move || async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<Value, _>(PortalError::Network("offline".to_string()))
                    },
                    &[cache_key!["tickets"]],
                )
                .await
        };
        assert!(failed.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry(&tickets.key).unwrap().state, EntryState::Fresh);

        let created = cache
            .mutate(|| async { Ok(json!({ "pk": 3 })) }, &[cache_key!["tickets"]])
            .await
            .unwrap();
        assert_eq!(created, json!({ "pk": 3 }));
        assert_eq!(cache.entry(&tickets.key).unwrap().state, EntryState::Stale);

        cache.query(&tickets, counting(&calls, json!([{ "pk": 3 }]))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_prefetch_leaves_no_error() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["logements", 9]);

        let result = cache
            .prefetch(&query, failing(&calls, PortalError::Network("down".to_string())))
            .await;
        assert!(result.is_err());
        assert!(cache.entry(&query.key).is_none());
        assert_eq!(cache.view(&query).error, None);
    }

    #[tokio::test]
    async fn test_failed_prefetch_keeps_existing_data() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["logements", 9]);
        cache.query(&query, counting(&calls, json!("v1"))).await.unwrap();
        cache.invalidate(&query.key);

        let _ = cache
            .prefetch(&query, failing(&calls, PortalError::http(503)))
            .await;
        let view = cache.view(&query);
        assert_eq!(view.data, Some(json!("v1")));
        assert_eq!(view.error, None);
        assert_eq!(cache.entry(&query.key).unwrap().state, EntryState::Stale);
    }

    #[tokio::test]
    async fn test_cancelled_prefetch_detaches_its_fetch() {
        let cache = QueryCache::in_memory(config());
        let query = batch(cache_key!["logements", 6]);
        let never = || futures::future::pending::<Result<Value>>();

        let prefetch = {
            let cache = cache.clone();
            let query = query.clone();
            tokio::spawn(async move { cache.prefetch(&query, never).await })
        };
        while cache.entry(&query.key).map(|e| e.state) != Some(EntryState::Fetching) {
            tokio::task::yield_now().await;
        }

        prefetch.abort();
        assert!(prefetch.await.unwrap_err().is_cancelled());
        assert!(cache.entry(&query.key).is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.query(&query, counting(&calls, json!("later"))).await.unwrap();
        assert_eq!(value, json!("later"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_query_keeps_stale_data_alongside_error() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let query = batch(cache_key!["logements", 4]);
        cache.query(&query, counting(&calls, json!("cached"))).await.unwrap();
        cache.invalidate(&query.key);

        let err = cache
            .query(&query, failing(&calls, PortalError::Network("offline".to_string())))
            .await
            .unwrap_err();
        assert!(err.is_network());

        let view = cache.view(&query);
        assert_eq!(view.data, Some(json!("cached")));
        assert!(view.is_error());
        assert!(view.is_stale);
        assert_eq!(cache.entry(&query.key).unwrap().state, EntryState::Error);
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let cache = QueryCache::in_memory(config());
        let query = batch(cache_key!["logements", 5]);
        let release = Arc::new(Notify::new());

        let slow = {
            let release = Arc::clone(&release);
            move || {
                let release = Arc::clone(&release);
                async move {
                    release.notified().await;
                    Ok(json!("old"))
                }
            }
        };
        let pending = {
            let cache = cache.clone();
            let query = query.clone();
            tokio::spawn(async move { cache.query(&query, slow).await })
        };
        // Let the slow fetch register as in flight
        while cache.entry(&query.key).map(|e| e.state) != Some(EntryState::Fetching) {
            tokio::task::yield_now().await;
        }

        cache.invalidate(&query.key);
        let fresh = cache
            .query(&query, || async { Ok(json!("new")) })
            .await
            .unwrap();
        assert_eq!(fresh, json!("new"));

        release.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), json!("old"));
        assert_eq!(cache.entry(&query.key).unwrap().data, Some(json!("new")));
    }

    #[tokio::test]
    async fn test_set_data_supersedes_in_flight_fetch() {
        let cache = QueryCache::in_memory(config());
        let query = batch(cache_key!["immeubles", 2]);
        let release = Arc::new(Notify::new());

        let slow = {
            let release = Arc::clone(&release);
            move || {
                let release = Arc::clone(&release);
                async move {
                    release.notified().await;
                    Ok(json!("fetched"))
                }
            }
        };
        let pending = {
            let cache = cache.clone();
            let query = query.clone();
            tokio::spawn(async move { cache.query(&query, slow).await })
        };
        while cache.entry(&query.key).map(|e| e.state) != Some(EntryState::Fetching) {
            tokio::task::yield_now().await;
        }

        cache.set_data(&query.key, json!("optimistic"), Freshness::UntilMidnight);
        release.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(cache.entry(&query.key).unwrap().data, Some(json!("optimistic")));
    }

    #[tokio::test]
    async fn test_persist_and_restore_allow_listed_entries() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _clock) = cache_at("2024-05-01T10:00:00Z", store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let logement = batch(cache_key!["logements", 1]);
        let parc = batch(cache_key!["parc"]);
        let tickets = Query::new(cache_key!["tickets"], Freshness::For(Duration::from_secs(60)));
        cache.query(&logement, counting(&calls, json!({ "pk": 1 }))).await.unwrap();
        cache.query(&parc, counting(&calls, json!({ "total": 40 }))).await.unwrap();
        cache.query(&tickets, counting(&calls, json!([]))).await.unwrap();

        let (restored, _clock) = cache_at("2024-05-01T11:00:00Z", store);
        assert_eq!(restored.len(), 2);
        for key in [&logement.key, &parc.key] {
            let before = cache.entry(key).unwrap();
            let after = restored.entry(key).unwrap();
            assert_eq!(after.data, before.data);
            assert_eq!(after.fetched_at, before.fetched_at);
            assert_eq!(after.stale_at, before.stale_at);
        }
        assert!(restored.entry(&tickets.key).is_none());

        // Restored data is served without a network call
        restored.query(&logement, counting(&calls, json!(null))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalidation_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _clock) = cache_at("2024-05-01T10:00:00Z", store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let logement = batch(cache_key!["logements", 1]);
        let fuites = batch(cache_key!["logements", 1, "fuites"]);
        cache.query(&logement, counting(&calls, json!("v1"))).await.unwrap();
        cache.query(&fuites, counting(&calls, json!([]))).await.unwrap();

        assert_eq!(cache.invalidate(&logement.key), 2);
        assert_eq!(cache.entry(&logement.key).unwrap().state, EntryState::Stale);

        let (restored, _clock) = cache_at("2024-05-01T10:01:00Z", store.clone());
        for key in [&logement.key, &fuites.key] {
            let entry = restored.entry(key).unwrap();
            assert_eq!(entry.state, EntryState::Stale);
            assert_eq!(entry.data, cache.entry(key).unwrap().data);
        }
        assert!(restored.view(&logement).is_stale);

        let value = restored.query(&logement, counting(&calls, json!("v2"))).await.unwrap();
        assert_eq!(value, json!("v2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // The refetched entry is persisted fresh again
        let (again, _clock) = cache_at("2024-05-01T10:02:00Z", store);
        assert_eq!(again.entry(&logement.key).unwrap().state, EntryState::Fresh);
        assert_eq!(again.entry(&fuites.key).unwrap().state, EntryState::Stale);
    }

    #[tokio::test]
    async fn test_version_mismatch_restores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _clock) = cache_at("2024-05-01T10:00:00Z", store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .query(&batch(cache_key!["logements", 1]), counting(&calls, json!(1)))
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::utc(at("2024-05-01T10:05:00Z")));
        let upgraded = QueryCache::new(config().with_version("portal-cache-v2"), store, clock);
        assert!(upgraded.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::with_quota(8));
        let (cache, _clock) = cache_at("2024-05-01T10:00:00Z", store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cache
            .query(&batch(cache_key!["logements", 1]), counting(&calls, json!("big payload")))
            .await
            .unwrap();
        assert_eq!(value, json!("big payload"));
        assert_eq!(store.read().unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_and_clear_are_persisted() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _clock) = cache_at("2024-05-01T10:00:00Z", store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let first = batch(cache_key!["logements", 1]);
        let second = batch(cache_key!["logements", 2]);
        cache.query(&first, counting(&calls, json!(1))).await.unwrap();
        cache.query(&second, counting(&calls, json!(2))).await.unwrap();

        assert!(cache.remove(&first.key));
        assert!(!cache.remove(&first.key));
        let (reloaded, _clock) = cache_at("2024-05-01T10:10:00Z", store.clone());
        assert_eq!(reloaded.len(), 1);

        cache.clear();
        let (reloaded, _clock) = cache_at("2024-05-01T10:20:00Z", store);
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_by_prefix() {
        let cache = QueryCache::in_memory(config());
        let calls = Arc::new(AtomicUsize::new(0));
        for key in [
            cache_key!["logements", 1],
            cache_key!["logements", 1, "fuites"],
            cache_key!["logements", 2],
        ] {
            cache.query(&batch(key), counting(&calls, json!([]))).await.unwrap();
        }

        assert_eq!(cache.invalidate(&cache_key!["logements", 1]), 2);
        assert_eq!(
            cache.entry(&cache_key!["logements", 2]).unwrap().state,
            EntryState::Fresh
        );
        assert_eq!(
            cache.entry(&cache_key!["logements", 1, "fuites"]).unwrap().state,
            EntryState::Stale
        );
    }
}
