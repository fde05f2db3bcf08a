//! Process-wide query cache.
//!
//! One `QueryCache` is built per session and cloned into every consumer (it is
//! a handle over shared state). All mutation goes through a single
//! `parking_lot::Mutex`, which is never held across an `.await`.
//!
//! Per key there is at most one in-flight fetch. It is a `Shared` future that
//! is spawned onto the runtime as soon as it is created, so it completes even
//! if every caller stops waiting; concurrent callers just await a clone.
//!
//! Observers hold a `watch` receiver per key and see every transition
//! (`Loading`, retry progress, `Success`, `Error`). Observing a key does not
//! create a cache entry, which keeps gated dependents `Idle` with no entry.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::constants::cache;
use crate::error::FetchError;
use crate::events::LifecycleEvent;
use crate::net::{self, RetryPolicy};
use crate::query_key::QueryKey;
use crate::sequencer::{DependencyEdge, DependencyGraph, PendingQuery};

pub(crate) type Payload = Arc<dyn Any + Send + Sync>;
pub(crate) type FetchResult = Result<Payload, FetchError>;
pub(crate) type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Per-call cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: cache::STALE_TIME,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueryOptions {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Untyped state published to observers.
#[derive(Clone)]
pub(crate) struct EntrySnapshot {
    status: QueryStatus,
    data: Option<Payload>,
    error: Option<FetchError>,
    last_fetched_at: Option<Instant>,
    retry_count: u32,
}

impl EntrySnapshot {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            retry_count: 0,
        }
    }
}

/// Typed view of one cache entry.
///
/// `data` survives a later failure or a background refetch, so a screen can
/// keep showing the last good payload next to an error or spinner.
#[derive(Debug)]
pub struct QueryEntry<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<FetchError>,
    pub last_fetched_at: Option<Instant>,
    /// Failed attempts in the most recent fetch cycle.
    pub retry_count: u32,
}

impl<T> Clone for QueryEntry<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            last_fetched_at: self.last_fetched_at,
            retry_count: self.retry_count,
        }
    }
}

impl<T> QueryEntry<T> {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            retry_count: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == QueryStatus::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }
}

impl<T: Send + Sync + 'static> QueryEntry<T> {
    fn from_snapshot(s: &EntrySnapshot) -> Self {
        let data = s.data.clone().and_then(|payload| match payload.downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                log::warn!(
                    "[query_cache] payload type mismatch, expected {}",
                    std::any::type_name::<T>()
                );
                None
            }
        });
        Self {
            status: s.status,
            data,
            error: s.error.clone(),
            last_fetched_at: s.last_fetched_at,
            retry_count: s.retry_count,
        }
    }
}

/// Live view of one key. Dropping it stops observing.
pub struct QuerySubscription<T> {
    key: QueryKey,
    rx: watch::Receiver<EntrySnapshot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QuerySubscription<T> {
    fn new(key: QueryKey, rx: watch::Receiver<EntrySnapshot>) -> Self {
        Self {
            key,
            rx,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QueryEntry<T> {
        QueryEntry::from_snapshot(&self.rx.borrow())
    }

    /// Wait for the next published transition.
    pub async fn changed(&mut self) -> Option<QueryEntry<T>> {
        self.rx.changed().await.ok()?;
        Some(QueryEntry::from_snapshot(&self.rx.borrow_and_update()))
    }

    /// Wait until the entry satisfies `pred`; checks the current state first.
    pub async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&QueryEntry<T>) -> bool,
    ) -> Option<QueryEntry<T>> {
        loop {
            let entry = QueryEntry::from_snapshot(&self.rx.borrow_and_update());
            if pred(&entry) {
                return Some(entry);
            }
            self.rx.changed().await.ok()?;
        }
    }

    /// Wait for `Success` or `Error`. Never resolves for a dependent whose
    /// parent does not succeed.
    pub async fn settled(&mut self) -> Option<QueryEntry<T>> {
        self.wait_for(|e| e.is_success() || e.is_error()).await
    }
}

struct InFlight {
    generation: u64,
    future: SharedFetch,
}

struct CacheSlot {
    status: QueryStatus,
    data: Option<Payload>,
    error: Option<FetchError>,
    last_fetched_at: Option<Instant>,
    retry_count: u32,
    invalidated: bool,
    last_used: Instant,
    options: QueryOptions,
    fetcher: ErasedFetcher,
    in_flight: Option<InFlight>,
    // Accumulated lists are never revalidated by staleness.
    paginated: bool,
}

impl CacheSlot {
    fn new(fetcher: ErasedFetcher, options: QueryOptions, now: Instant) -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            retry_count: 0,
            invalidated: false,
            last_used: now,
            options,
            fetcher,
            in_flight: None,
            paginated: false,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.status == QueryStatus::Success
            && !self.invalidated
            && self
                .last_fetched_at
                .is_some_and(|at| now.duration_since(at) < self.options.stale_time)
    }

    fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            last_fetched_at: self.last_fetched_at,
            retry_count: self.retry_count,
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheSlot>,
    observers: HashMap<QueryKey, watch::Sender<EntrySnapshot>>,
    dependents: DependencyGraph,
    next_page_in_flight: HashSet<QueryKey>,
    next_generation: u64,
    offline: bool,
}

impl CacheState {
    fn snapshot(&self, key: &QueryKey) -> EntrySnapshot {
        self.entries
            .get(key)
            .map(CacheSlot::snapshot)
            .unwrap_or_else(EntrySnapshot::idle)
    }

    fn publish(&self, key: &QueryKey) {
        if let Some(tx) = self.observers.get(key) {
            tx.send_replace(self.snapshot(key));
        }
    }

    fn is_observed(&self, key: &QueryKey) -> bool {
        self.observers
            .get(key)
            .is_some_and(|tx| tx.receiver_count() > 0)
    }

    fn observe(&mut self, key: &QueryKey) -> watch::Receiver<EntrySnapshot> {
        if let Some(slot) = self.entries.get_mut(key) {
            slot.last_used = Instant::now();
        }
        if let Some(tx) = self.observers.get(key) {
            return tx.subscribe();
        }
        let (tx, rx) = watch::channel(self.snapshot(key));
        self.observers.insert(key.clone(), tx);
        rx
    }

    /// Create the slot if missing and install the latest fetcher and options.
    fn upsert(
        &mut self,
        key: &QueryKey,
        fetcher: ErasedFetcher,
        options: QueryOptions,
        now: Instant,
    ) -> &mut CacheSlot {
        let slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheSlot::new(fetcher.clone(), options, now));
        slot.fetcher = fetcher;
        slot.options = options;
        slot.last_used = now;
        slot
    }
}

/// Box a typed fetcher into the cache's payload-erased form.
pub(crate) fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move { fut.await.map(|data| Arc::new(data) as Payload) }.boxed()
    })
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheState>>,
    defaults: QueryOptions,
    gc_time: Duration,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryOptions::default(), cache::GC_TIME)
    }
}

impl QueryCache {
    pub fn new(defaults: QueryOptions, gc_time: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState::default())),
            defaults,
            gc_time,
        }
    }

    /// Options used by screens that do not override them.
    pub fn default_options(&self) -> QueryOptions {
        self.defaults
    }

    /// Return the entry for `key`, fetching first unless it is fresh.
    ///
    /// Joins the in-flight fetch if one exists, so concurrent callers share
    /// a single network call and observe the same result.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
        options: QueryOptions,
    ) -> QueryEntry<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if let Some(fut) = self.ensure(&key, erase(fetcher), options) {
            let _ = fut.await;
        }
        self.entry(&key)
    }

    /// Like `fetch_query` but does not wait for the result.
    pub fn prefetch<T, F, Fut>(&self, key: QueryKey, fetcher: F, options: QueryOptions)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let _ = self.ensure(&key, erase(fetcher), options);
    }

    /// Declare `edge.dependent`; it fetches once `edge.parent` is `Success`.
    ///
    /// Until then the dependent stays `Idle` with no cache entry. If the
    /// parent fails the dependent keeps waiting; a later successful parent
    /// fetch (for example a manual refetch) releases it.
    pub fn fetch_dependent<T, F, Fut>(
        &self,
        edge: DependencyEdge,
        fetcher: F,
        options: QueryOptions,
    ) -> QuerySubscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let pending = PendingQuery {
            key: edge.dependent.clone(),
            fetcher: erase(fetcher),
            options,
        };

        let mut state = self.inner.lock();
        let rx = state.observe(&edge.dependent);
        let parent_ready = state
            .entries
            .get(&edge.parent)
            .is_some_and(|slot| slot.status == QueryStatus::Success);

        if parent_ready {
            self.enable_dependent(&mut state, pending);
        } else {
            log::debug!(
                "[query_cache] {} waits on {}",
                edge.dependent,
                edge.parent
            );
            state.dependents.register(edge.parent, pending);
        }
        QuerySubscription::new(edge.dependent, rx)
    }

    pub fn subscribe<T: Send + Sync + 'static>(&self, key: QueryKey) -> QuerySubscription<T> {
        let rx = self.inner.lock().observe(&key);
        QuerySubscription::new(key, rx)
    }

    pub fn entry<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryEntry<T> {
        QueryEntry::from_snapshot(&self.inner.lock().snapshot(key))
    }

    pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        self.entry::<T>(key).data
    }

    /// Seed or overwrite `key` with `data` as a fresh success.
    ///
    /// A key seeded before any fetcher was registered keeps a placeholder
    /// fetcher that fails until the first real `fetch_query` replaces it.
    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: QueryKey, data: T) {
        let mut state = self.inner.lock();
        let now = Instant::now();
        let defaults = self.defaults;
        let slot = state.entries.entry(key.clone()).or_insert_with(|| {
            let placeholder = erase(|| async {
                Err::<(), _>(FetchError::malformed("no fetcher registered"))
            });
            CacheSlot::new(placeholder, defaults, now)
        });
        slot.status = QueryStatus::Success;
        slot.data = Some(Arc::new(data) as Payload);
        slot.error = None;
        slot.last_fetched_at = Some(now);
        slot.last_used = now;
        slot.invalidated = false;
        slot.in_flight = None;
        state.publish(&key);
        for pending in state.dependents.take_ready(&key) {
            self.enable_dependent(&mut state, pending);
        }
    }

    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        self.inner
            .lock()
            .entries
            .get(key)
            .map_or(QueryStatus::Idle, |slot| slot.status)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Number of dependents still gated on `parent`.
    pub fn waiting_on(&self, parent: &QueryKey) -> usize {
        self.inner.lock().dependents.waiting_on(parent)
    }

    /// True while `key` is a declared dependent whose parent has not succeeded.
    pub fn is_gated(&self, key: &QueryKey) -> bool {
        self.inner.lock().dependents.is_waiting(key)
    }

    /// Force a fetch regardless of staleness. Joins an in-flight fetch.
    /// Keys that were never requested stay `Idle`.
    pub async fn refetch(&self, key: &QueryKey) -> QueryStatus {
        let pending = {
            let mut state = self.inner.lock();
            self.start_fetch(&mut state, key)
        };
        if let Some(fut) = pending {
            let _ = fut.await;
        }
        self.status(key)
    }

    /// Mark the entry stale; refetches right away if someone observes it.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = self.inner.lock();
        let Some(slot) = state.entries.get_mut(key) else {
            return false;
        };
        slot.invalidated = true;
        if state.is_observed(key) {
            let _ = self.start_fetch(&mut state, key);
        }
        true
    }

    /// Invalidate every key starting with `prefix`. Returns how many matched.
    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let mut state = self.inner.lock();
        let keys: Vec<QueryKey> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(slot) = state.entries.get_mut(key) {
                slot.invalidated = true;
            }
            if state.is_observed(key) {
                let _ = self.start_fetch(&mut state, key);
            }
        }
        keys.len()
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let mut state = self.inner.lock();
        let removed = state.entries.remove(key).is_some();
        state.next_page_in_flight.remove(key);
        if removed {
            state.dependents.forget(key);
        }
        state.publish(key);
        removed
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.next_page_in_flight.clear();
        state.dependents.clear();
        for tx in state.observers.values() {
            tx.send_replace(EntrySnapshot::idle());
        }
    }

    /// Drop entries nobody observes that were last used more than `gc_time`
    /// ago. In-flight entries are kept. Returns how many were evicted.
    pub fn collect_garbage(&self) -> usize {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let now = Instant::now();
        let gc_time = self.gc_time;
        let before = state.entries.len();

        let observers = &state.observers;
        let paging = &state.next_page_in_flight;
        let mut evicted = Vec::new();
        state.entries.retain(|key, slot| {
            let keep = slot.in_flight.is_some()
                || paging.contains(key)
                || observers.get(key).is_some_and(|tx| tx.receiver_count() > 0)
                || now.duration_since(slot.last_used) < gc_time;
            if !keep {
                evicted.push(key.clone());
            }
            keep
        });
        for key in &evicted {
            let dropped = state.dependents.forget(key);
            if dropped > 0 {
                log::debug!("[query_cache] dropped {dropped} dependents of evicted {key}");
            }
        }

        let entries = &state.entries;
        state
            .observers
            .retain(|key, tx| tx.receiver_count() > 0 || entries.contains_key(key));

        before - state.entries.len()
    }

    pub fn spawn_gc(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let evicted = cache.collect_garbage();
                if evicted > 0 {
                    log::debug!("[query_cache] gc evicted {evicted} entries");
                }
            }
        })
    }

    pub fn is_online(&self) -> bool {
        !self.inner.lock().offline
    }

    /// Apply one lifecycle event. Returns how many queries were refetched.
    pub fn handle_event(&self, event: LifecycleEvent) -> usize {
        match event {
            LifecycleEvent::Foreground => self.revalidate_observed(),
            LifecycleEvent::Background => 0,
            LifecycleEvent::Offline => {
                self.inner.lock().offline = true;
                0
            }
            LifecycleEvent::Online => {
                let was_offline = std::mem::replace(&mut self.inner.lock().offline, false);
                if was_offline {
                    self.revalidate_observed()
                } else {
                    0
                }
            }
        }
    }

    pub fn spawn_event_listener(
        &self,
        mut rx: broadcast::Receiver<LifecycleEvent>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let refetched = cache.handle_event(event);
                        if refetched > 0 {
                            log::info!("[query_cache] {event:?}: revalidating {refetched} queries");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[query_cache] event listener lagged, skipped {skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            log::debug!("[query_cache] event listener shutting down");
        })
    }

    // Accumulated-list support, used by `pagination`.

    /// Load page one of a list key unless the key already holds data.
    pub(crate) async fn load_list(
        &self,
        key: &QueryKey,
        fetcher: ErasedFetcher,
        options: QueryOptions,
    ) {
        let pending = {
            let mut state = self.inner.lock();
            let slot = state.upsert(key, fetcher, options, Instant::now());
            slot.paginated = true;
            if slot.data.is_some() {
                None
            } else {
                self.start_fetch(&mut state, key)
            }
        };
        if let Some(fut) = pending {
            let _ = fut.await;
        }
    }

    /// Claim the next-page slot for `key`. False if a next page is in flight.
    pub(crate) fn begin_next_page(&self, key: &QueryKey) -> bool {
        self.inner.lock().next_page_in_flight.insert(key.clone())
    }

    pub(crate) fn end_next_page(&self, key: &QueryKey) {
        self.inner.lock().next_page_in_flight.remove(key);
    }

    /// Replace the payload of `key` with `f(current)`, publishing the change.
    /// `None` from `f` leaves the entry untouched.
    pub(crate) fn update_data<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        f: impl FnOnce(&T) -> Option<T>,
    ) -> Option<Arc<T>> {
        let mut state = self.inner.lock();
        let slot = state.entries.get_mut(key)?;
        let current = slot.data.clone()?.downcast::<T>().ok()?;
        let next = Arc::new(f(&current)?);
        slot.data = Some(next.clone() as Payload);
        slot.last_used = Instant::now();
        state.publish(key);
        Some(next)
    }

    fn ensure(
        &self,
        key: &QueryKey,
        fetcher: ErasedFetcher,
        options: QueryOptions,
    ) -> Option<SharedFetch> {
        let mut state = self.inner.lock();
        let now = Instant::now();
        if state.upsert(key, fetcher, options, now).is_fresh(now) {
            log::trace!("[query_cache] {key} is fresh");
            return None;
        }
        self.start_fetch(&mut state, key)
    }

    fn enable_dependent(&self, state: &mut CacheState, pending: PendingQuery) {
        let now = Instant::now();
        let fresh = state
            .upsert(&pending.key, pending.fetcher, pending.options, now)
            .is_fresh(now);
        if !fresh {
            log::debug!("[query_cache] dependent {} enabled", pending.key);
            let _ = self.start_fetch(state, &pending.key);
        }
    }

    fn revalidate_observed(&self) -> usize {
        let mut state = self.inner.lock();
        let now = Instant::now();
        let keys: Vec<QueryKey> = {
            let st = &*state;
            st.entries
                .iter()
                .filter(|(key, slot)| {
                    !slot.paginated
                        && slot.in_flight.is_none()
                        && !slot.is_fresh(now)
                        && st.is_observed(key)
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        for key in &keys {
            let _ = self.start_fetch(&mut state, key);
        }
        keys.len()
    }

    fn start_fetch(&self, state: &mut CacheState, key: &QueryKey) -> Option<SharedFetch> {
        let generation = state.next_generation;
        let slot = state.entries.get_mut(key)?;
        if let Some(in_flight) = &slot.in_flight {
            log::debug!("[query_cache] {key} joins in-flight fetch");
            return Some(in_flight.future.clone());
        }

        let fetcher = slot.fetcher.clone();
        let retry = slot.options.retry;
        let cache = self.clone();
        let owned_key = key.clone();
        let future = async move {
            let label = owned_key.to_string();
            let result = net::run_with_retry(
                retry,
                &label,
                || fetcher(),
                |failures, _| cache.record_failure(&owned_key, generation, failures),
            )
            .await;
            cache.complete(&owned_key, generation, result.clone());
            result
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            generation,
            future: future.clone(),
        });
        slot.status = QueryStatus::Loading;
        slot.retry_count = 0;
        state.next_generation += 1;
        state.publish(key);

        log::debug!("[query_cache] fetching {key}");
        tokio::spawn(future.clone());
        Some(future)
    }

    fn record_failure(&self, key: &QueryKey, generation: u64, failures: u32) {
        let mut state = self.inner.lock();
        let Some(slot) = state.entries.get_mut(key) else {
            return;
        };
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            slot.retry_count = failures;
            state.publish(key);
        }
    }

    fn complete(&self, key: &QueryKey, generation: u64, result: FetchResult) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let Some(slot) = state.entries.get_mut(key) else {
            log::debug!("[query_cache] {key} removed before its fetch finished");
            return;
        };
        if slot.in_flight.as_ref().map(|f| f.generation) != Some(generation) {
            return;
        }
        slot.in_flight = None;

        let succeeded = result.is_ok();
        match result {
            Ok(payload) => {
                slot.status = QueryStatus::Success;
                slot.data = Some(payload);
                slot.error = None;
                slot.last_fetched_at = Some(Instant::now());
                slot.invalidated = false;
            }
            Err(err) => {
                log::warn!("[query_cache] {key} failed: {err}");
                slot.status = QueryStatus::Error;
                slot.error = Some(err);
            }
        }
        state.publish(key);

        if succeeded {
            for pending in state.dependents.take_ready(key) {
                self.enable_dependent(state, pending);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn counting<T: Clone + Send + Sync + 'static>(
        value: T,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move { Ok(value) }.boxed()
        }
    }

    fn no_retry() -> QueryOptions {
        QueryOptions::default().with_retry(RetryPolicy::none())
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_fetch() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("gameDetail").with("1");

        let slow = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, FetchError>(String::from("game"))
                }
            }
        };

        let (a, b) = tokio::join!(
            cache.fetch_query(key.clone(), slow.clone(), QueryOptions::default()),
            cache.fetch_query(key.clone(), slow, QueryOptions::default()),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(a.is_success() && b.is_success());
        assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_served_from_cache() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("standings");
        let options = QueryOptions::default().with_stale_time(Duration::from_secs(5));

        cache
            .fetch_query(key.clone(), counting(1u32, calls.clone()), options)
            .await;
        tokio::time::advance(Duration::from_millis(4_999)).await;
        let entry = cache
            .fetch_query(key.clone(), counting(2u32, calls.clone()), options)
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.data(), Some(&1));

        tokio::time::advance(Duration::from_millis(1)).await;
        let entry = cache
            .fetch_query(key.clone(), counting(2u32, calls.clone()), options)
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(entry.data(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_twice_then_succeeding_ends_in_success() {
        let cache = QueryCache::default();
        let attempts: Arc<Mutex<Vec<Instant>>> = Arc::default();
        let key = QueryKey::new("playerDetails").with("23");

        let fetcher = {
            let attempts = attempts.clone();
            move || {
                let n = {
                    let mut at = attempts.lock();
                    at.push(Instant::now());
                    at.len()
                };
                async move {
                    if n < 3 {
                        Err(FetchError::Http {
                            status: 502,
                            status_text: "Bad Gateway".into(),
                        })
                    } else {
                        Ok(format!("attempt {n}"))
                    }
                }
            }
        };

        let entry = cache
            .fetch_query(key, fetcher, QueryOptions::default())
            .await;

        assert!(entry.is_success());
        assert_eq!(entry.data().map(String::as_str), Some("attempt 3"));
        assert_eq!(entry.retry_count, 2);

        let at = attempts.lock();
        assert_eq!(at.len(), 3);
        assert!(at[1] - at[0] >= Duration::from_millis(1000));
        assert!(at[2] - at[1] >= Duration::from_millis(2000));
        assert!(at[2] - at[1] >= at[1] - at[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_error() {
        let cache = QueryCache::default();
        let key = QueryKey::new("news");
        let entry: QueryEntry<u32> = cache
            .fetch_query(
                key,
                || async {
                    Err(FetchError::RateLimit {
                        status_text: "Too Many Requests".into(),
                    })
                },
                QueryOptions::default(),
            )
            .await;
        assert!(entry.is_error());
        assert!(entry.error.as_ref().is_some_and(FetchError::is_rate_limit));
        assert_eq!(entry.retry_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_waits_for_parent_success() {
        let cache = QueryCache::default();
        let gate = Arc::new(Notify::new());
        let parent = QueryKey::new("playerDetails").with("23");
        let child = QueryKey::new("playerBio").with("23");
        let child_calls = Arc::new(AtomicUsize::new(0));

        let mut bio = cache.fetch_dependent::<String, _, _>(
            DependencyEdge::new(parent.clone(), child.clone()),
            counting(String::from("bio"), child_calls.clone()),
            no_retry(),
        );
        assert!(bio.current().is_idle());
        assert!(!cache.contains(&child));
        assert_eq!(cache.waiting_on(&parent), 1);
        assert!(cache.is_gated(&child));

        let parent_task = {
            let cache = cache.clone();
            let gate = gate.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                cache
                    .fetch_query(
                        parent,
                        move || {
                            let gate = gate.clone();
                            async move {
                                gate.notified().await;
                                Ok::<_, FetchError>(23u32)
                            }
                        },
                        no_retry(),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cache.status(&parent), QueryStatus::Loading);
        assert!(bio.current().is_idle());
        assert_eq!(child_calls.load(Ordering::SeqCst), 0);

        gate.notify_one();
        let parent_entry = parent_task.await.unwrap();
        assert!(parent_entry.is_success());

        let settled = bio.settled().await.unwrap();
        assert_eq!(settled.data().map(String::as_str), Some("bio"));
        assert_eq!(child_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.waiting_on(&parent), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_stays_idle_when_parent_fails() {
        let cache = QueryCache::default();
        let parent = QueryKey::new("gameDetail").with("9");
        let child = QueryKey::new("gameSummary").with("9");
        let child_calls = Arc::new(AtomicUsize::new(0));

        let summary = cache.fetch_dependent::<String, _, _>(
            DependencyEdge::new(parent.clone(), child.clone()),
            counting(String::from("summary"), child_calls.clone()),
            no_retry(),
        );

        let parent_entry: QueryEntry<u32> = cache
            .fetch_query(
                parent.clone(),
                || async {
                    Err(FetchError::Api {
                        message: "game not found".into(),
                    })
                },
                no_retry(),
            )
            .await;
        assert!(parent_entry.is_error());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(summary.current().is_idle());
        assert!(!cache.contains(&child));
        assert_eq!(child_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_failed_parent_forgets_its_dependents() {
        let cache = QueryCache::new(QueryOptions::default(), Duration::from_secs(60));
        let failing = || async {
            Err::<u32, _>(FetchError::Api {
                message: "player not found".into(),
            })
        };

        let removed = QueryKey::new("playerDetails").with("0");
        let _bio = cache.fetch_dependent::<String, _, _>(
            DependencyEdge::new(removed.clone(), QueryKey::new("playerBio").with("0")),
            counting(String::from("bio"), Arc::new(AtomicUsize::new(0))),
            no_retry(),
        );
        cache.fetch_query(removed.clone(), failing, no_retry()).await;
        assert_eq!(cache.waiting_on(&removed), 1);
        assert!(cache.remove(&removed));
        assert_eq!(cache.waiting_on(&removed), 0);

        let evicted = QueryKey::new("teamOverview").with("XYZ");
        let leaders = QueryKey::new("teamLeaders").with("XYZ");
        let _leaders = cache.fetch_dependent::<String, _, _>(
            DependencyEdge::new(evicted.clone(), leaders.clone()),
            counting(String::from("leaders"), Arc::new(AtomicUsize::new(0))),
            no_retry(),
        );
        cache.fetch_query(evicted.clone(), failing, no_retry()).await;
        assert!(cache.is_gated(&leaders));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.collect_garbage(), 1);
        assert!(!cache.is_gated(&leaders));
        assert_eq!(cache.waiting_on(&evicted), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_of_successful_parent_starts_immediately() {
        let cache = QueryCache::default();
        let parent = QueryKey::new("teamOverview").with("BOS");
        let child = QueryKey::new("teamLeaders").with("BOS");
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .fetch_query(parent.clone(), counting(1u8, calls.clone()), no_retry())
            .await;
        let mut leaders = cache.fetch_dependent::<u8, _, _>(
            DependencyEdge::new(parent, child),
            counting(2u8, calls.clone()),
            no_retry(),
        );
        assert!(leaders.current().is_loading());
        assert_eq!(leaders.settled().await.unwrap().data(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn observers_see_every_transition() {
        let cache = QueryCache::default();
        let key = QueryKey::new("leaders").with("pts");
        let mut sub = cache.subscribe::<u32>(key.clone());
        assert!(sub.current().is_idle());

        cache.prefetch(
            key.clone(),
            || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, FetchError>(30u32)
            },
            no_retry(),
        );
        assert!(sub.changed().await.unwrap().is_loading());
        let done = sub.changed().await.unwrap();
        assert!(done.is_success());
        assert_eq!(done.data(), Some(&30));
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_ignores_staleness_but_joins_in_flight() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("standings");

        cache
            .fetch_query(key.clone(), counting(1u32, calls.clone()), QueryOptions::default())
            .await;
        assert_eq!(cache.refetch(&key).await, QueryStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let (a, b) = tokio::join!(cache.refetch(&key), cache.refetch(&key));
        assert_eq!((a, b), (QueryStatus::Success, QueryStatus::Success));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(
            cache.refetch(&QueryKey::new("unknown")).await,
            QueryStatus::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_revalidates_only_observed_stale_entries() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let watched = QueryKey::new("games").with("20260114");
        let unwatched = QueryKey::new("standings");

        cache
            .fetch_query(watched.clone(), counting(1u32, calls.clone()), QueryOptions::default())
            .await;
        cache
            .fetch_query(unwatched.clone(), counting(1u32, calls.clone()), QueryOptions::default())
            .await;
        let _sub = cache.subscribe::<u32>(watched.clone());

        // Fresh: nothing to do.
        assert_eq!(cache.handle_event(LifecycleEvent::Foreground), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        // Online without a prior Offline is not a reconnect.
        assert_eq!(cache.handle_event(LifecycleEvent::Online), 0);
        assert_eq!(cache.handle_event(LifecycleEvent::Offline), 0);
        assert!(!cache.is_online());
        assert_eq!(cache.handle_event(LifecycleEvent::Online), 1);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_refetches_observed_entry() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("playerGameLog").with("23");

        cache
            .fetch_query(key.clone(), counting(1u32, calls.clone()), QueryOptions::default())
            .await;
        let mut sub = cache.subscribe::<u32>(key.clone());
        assert!(cache.invalidate(&key));
        assert!(sub.changed().await.unwrap().is_loading());
        assert!(sub.settled().await.unwrap().is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(cache.invalidate_prefix(&QueryKey::new("playerGameLog")), 1);
        assert!(!cache.invalidate(&QueryKey::new("missing")));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_data_is_fresh_and_releases_dependents() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let parent = QueryKey::new("gameDetail").with("5");
        let child = QueryKey::new("gameSummary").with("5");

        let mut summary = cache.fetch_dependent::<u32, _, _>(
            DependencyEdge::new(parent.clone(), child),
            counting(7u32, calls.clone()),
            no_retry(),
        );
        cache.set_query_data(parent.clone(), String::from("seeded"));
        assert_eq!(summary.settled().await.unwrap().data(), Some(&7));

        let entry: QueryEntry<String> = cache
            .fetch_query(parent.clone(), counting(String::from("net"), calls.clone()), no_retry())
            .await;
        assert_eq!(entry.data().map(String::as_str), Some("seeded"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(cache.remove(&parent));
        assert_eq!(cache.status(&parent), QueryStatus::Idle);
        assert!(cache.get_query_data::<String>(&parent).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn gc_evicts_only_unobserved_idle_entries() {
        let cache = QueryCache::new(QueryOptions::default(), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let kept = QueryKey::new("news");
        let dropped = QueryKey::new("standings");

        cache
            .fetch_query(kept.clone(), counting(1u32, calls.clone()), no_retry())
            .await;
        cache
            .fetch_query(dropped.clone(), counting(1u32, calls.clone()), no_retry())
            .await;
        let _sub = cache.subscribe::<u32>(kept.clone());

        assert_eq!(cache.collect_garbage(), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.contains(&kept));
        assert!(!cache.contains(&dropped));
    }
}
