use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use futures::future::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[cfg(feature = "stats")]
use crate::CacheStats;

use crate::dependency::Dependency;
use crate::entry::{CacheEntry, Freshness};
use crate::error::{CacheError, FetchError};
use crate::fetch::{
    erase, ErasedFetcher, ErasedValue, FetchContext, InFlight, Settlement, SettlementFuture,
};
use crate::invalidation::{InvalidationMetadata, InvalidationRegistry, InvalidationStrategy};
use crate::options::{CacheConfig, RefreshOptions, ResourceOptions};
use crate::subscription::{ResourceState, Subscription};

type Slot = Arc<Mutex<CacheEntry>>;

/// A shared, key-addressed resource cache.
///
/// Sits between data consumers and remote fetch functions so that:
///
/// - concurrent requests for one key never duplicate network traffic,
/// - data is reused by every consumer sharing a key,
/// - staleness (TTL expiry, dependency change) is explicit,
/// - mutations elsewhere can force a key to be refetched.
///
/// `ResourceCache` is a cheap handle (`Clone` shares the same table);
/// independent instances never share state.
///
/// # Concurrency
///
/// The table is a `DashMap` of individually locked entries. All bookkeeping
/// is synchronous; the only suspension point is the fetcher future, which
/// runs on a spawned Tokio task. Operations that start a fetch must therefore
/// run inside a Tokio runtime.
///
/// # Freshness decision
///
/// On every `subscribe` and non-forced `refresh`:
///
/// 1. disabled → no fetch,
/// 2. never loaded → fetch,
/// 3. dependencies changed → fetch, even inside the TTL window,
/// 4. older than the TTL → fetch,
/// 5. otherwise serve the entry (`from_cache = true`).
///
/// A needed fetch joins the one already in flight when it was started with
/// the same dependencies. Every fetch takes a sequence number when it starts;
/// an outcome is written only if no newer fetch has settled and the fetch was
/// not cancelled in the meantime.
///
/// # Examples
///
/// ```ignore
/// use resourcache_core::{FetchContext, FetchError, ResourceCache, ResourceOptions};
/// use std::time::Duration;
///
/// let cache = ResourceCache::new();
/// let mut portfolio = cache.subscribe(
///     "freelancer:portfolio:42",
///     |_ctx: FetchContext| async { Ok::<_, FetchError>(vec!["logo.png".to_string()]) },
///     ResourceOptions::new().ttl(Duration::from_secs(60)).dependency("42"),
/// )?;
///
/// let state = portfolio.settled().await;
/// assert_eq!(state.data.unwrap().len(), 1);
/// ```
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    entries: DashMap<String, Slot>,
    next_seq: AtomicU64,
    next_subscriber: AtomicU64,
    invalidation: RwLock<InvalidationRegistry>,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

/// Outcome of the freshness decision for one caller.
enum Decision {
    Fresh,
    Joined(u64),
    Started(u64),
}

impl Decision {
    fn origin(&self) -> Option<u64> {
        match self {
            Decision::Fresh => None,
            Decision::Joined(seq) | Decision::Started(seq) => Some(*seq),
        }
    }
}

impl ResourceCache {
    /// Creates an unnamed cache with the default TTL.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a cache from `config`. A named cache registers its statistics
    /// in the global stats registry.
    pub fn with_config(config: CacheConfig) -> Self {
        #[cfg(feature = "stats")]
        let stats = Arc::new(CacheStats::new());

        #[cfg(feature = "stats")]
        if let Some(name) = config.get_name() {
            crate::stats_registry::register(name, Arc::clone(&stats));
        }

        Self {
            inner: Arc::new(Inner {
                config,
                entries: DashMap::new(),
                next_seq: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(0),
                invalidation: RwLock::new(InvalidationRegistry::new()),
                #[cfg(feature = "stats")]
                stats,
            }),
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Registers a consumer of `key` and runs the freshness decision.
    ///
    /// Fetch failures never surface here: they are stored on the entry and
    /// reported through [`ResourceState::error`]. The only errors are an
    /// empty key and a key already bound to another payload type.
    ///
    /// # Panics
    ///
    /// Panics if a fetch is needed and the call is made outside a Tokio
    /// runtime.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: impl Into<String>,
        fetcher: F,
        options: ResourceOptions,
    ) -> Result<Subscription<T>, CacheError>
    where
        T: Any + Send + Sync,
        F: Fn(FetchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let fetcher = erase(fetcher);
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        // The shard lock is held while registering so that a concurrent
        // `remove_cache` sees the new subscriber.
        let slot_ref = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| {
                trace!(cache = self.label(), key = %key, "creating entry");
                Arc::new(Mutex::new(CacheEntry::new::<T>()))
            });
        let slot = Arc::clone(slot_ref.value());
        let mut entry = slot.lock();
        entry.check_type::<T>(&key)?;

        entry.subscribers.insert(id);

        // Key-level refresh reuses the latest enabled consumer's fetcher.
        let origin = if options.is_enabled() {
            entry.fetcher = Some(Arc::clone(&fetcher));
            entry.options = options.clone();
            self.inner
                .decide(&key, &slot, &mut entry, &options, &fetcher, false, false)
                .origin()
        } else {
            trace!(cache = self.label(), key = %key, "resource disabled, not fetching");
            None
        };
        let changes = entry.subscribe_changes();
        drop(entry);
        drop(slot_ref);

        Ok(Subscription::new(
            self.clone(),
            key,
            id,
            slot,
            fetcher,
            options,
            origin,
            changes,
        ))
    }

    /// Refreshes `key` with the fetcher and options of its latest enabled
    /// subscriber.
    ///
    /// With `force == false` an in-flight fetch is joined and a fresh entry is
    /// served without fetching. With `force == true` a new fetch always starts
    /// and the one in flight is cancelled. Failures are returned.
    ///
    /// A key only ever subscribed with `enabled(false)` is never fetched:
    /// the result is [`CacheError::Disabled`].
    pub async fn refresh<T>(&self, key: &str, options: RefreshOptions) -> Result<Arc<T>, CacheError>
    where
        T: Any + Send + Sync,
    {
        let slot = self
            .inner
            .entries
            .get(key)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| CacheError::UnknownKey(key.to_string()))?;
        self.refresh_slot::<T>(key, &slot, None, options.force, None)
            .await
    }

    pub(crate) async fn refresh_slot<T>(
        &self,
        key: &str,
        slot: &Slot,
        with: Option<(&ErasedFetcher, &ResourceOptions)>,
        force: bool,
        origin: Option<&AtomicU64>,
    ) -> Result<Arc<T>, CacheError>
    where
        T: Any + Send + Sync,
    {
        let (seq, settled) = {
            let mut entry = slot.lock();
            entry.check_type::<T>(key)?;

            let (fetcher, options) = match with {
                Some((fetcher, options)) => (Arc::clone(fetcher), options.clone()),
                None => {
                    let fetcher = entry
                        .fetcher
                        .clone()
                        .ok_or_else(|| CacheError::Disabled(key.to_string()))?;
                    (fetcher, entry.options.clone())
                }
            };
            if !options.is_enabled() {
                return Err(CacheError::Disabled(key.to_string()));
            }

            let decision = self
                .inner
                .decide(key, slot, &mut entry, &options, &fetcher, force, true);
            match decision {
                Decision::Fresh => {
                    if let Some(data) = entry.typed_data::<T>() {
                        return Ok(data);
                    }
                    // Unreachable in practice: a fresh entry always holds data.
                    return Err(CacheError::UnknownKey(key.to_string()));
                }
                Decision::Joined(seq) | Decision::Started(seq) => {
                    if let Some(origin) = origin {
                        origin.store(seq, Ordering::Release);
                    }
                    let settled = entry
                        .in_flight
                        .as_ref()
                        .map(|in_flight| in_flight.settled.clone())
                        .ok_or(CacheError::Fetch(FetchError::Cancelled))?;
                    (seq, settled)
                }
            }
        };

        self.inner
            .await_settlement::<T>(key, slot, seq, settled, origin)
            .await
    }

    /// Returns the current state of `key` without subscribing or fetching.
    pub fn peek<T>(&self, key: &str) -> Result<ResourceState<T>, CacheError>
    where
        T: Any + Send + Sync,
    {
        match self.inner.entries.get(key) {
            Some(slot) => {
                let entry = slot.lock();
                entry.check_type::<T>(key)?;
                Ok(entry.state(None))
            }
            None => Ok(ResourceState::empty()),
        }
    }

    /// Deletes the entry for `key` and cancels its in-flight fetch.
    ///
    /// The next `subscribe` for the key starts from an empty state and
    /// fetches. Entries that still have subscribers are reset in place
    /// instead, so those subscribers are notified of the removal.
    ///
    /// Returns whether an entry existed.
    pub fn remove_cache(&self, key: &str) -> bool {
        let removed = self
            .inner
            .entries
            .remove_if(key, |_, slot| slot.lock().subscribers.is_empty());

        if let Some((_, slot)) = removed {
            let mut entry = slot.lock();
            if entry.cancel_in_flight() {
                #[cfg(feature = "stats")]
                self.inner.stats.record_cancelled();
            }
            entry.notify();
            debug!(cache = self.label(), key, "entry removed");
            return true;
        }

        match self.inner.entries.get(key) {
            Some(slot) => {
                let mut entry = slot.lock();
                #[cfg(feature = "stats")]
                if entry.in_flight.is_some() {
                    self.inner.stats.record_cancelled();
                }
                entry.reset();
                debug!(
                    cache = self.label(),
                    key,
                    subscribers = entry.subscribers.len(),
                    "entry reset in place"
                );
                true
            }
            None => false,
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        self.remove_where(|key| key.starts_with(prefix))
    }

    /// Removes every entry whose key matches `predicate`.
    pub fn remove_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        // Collect first: removing while iterating would deadlock on the shard.
        let keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|item| predicate(item.key().as_str()))
            .map(|item| item.key().clone())
            .collect();

        keys.iter().filter(|key| self.remove_cache(key)).count()
    }

    /// Marks `key` stale without deleting its data.
    ///
    /// Subscribers keep seeing the old data; the next access refetches.
    pub fn invalidate(&self, key: &str) -> bool {
        match self.inner.entries.get(key) {
            Some(slot) => {
                slot.lock().invalidated = true;
                trace!(cache = self.label(), key, "entry invalidated");
                true
            }
            None => false,
        }
    }

    /// Drops entries nobody is subscribed to and nothing is fetching.
    ///
    /// Idle entries are never evicted automatically; call this to reclaim
    /// them. Returns how many entries were dropped.
    pub fn prune_idle(&self) -> usize {
        let pruned = AtomicUsize::new(0);
        self.inner.entries.retain(|_, slot| {
            let entry = slot.lock();
            let keep = !entry.subscribers.is_empty() || entry.in_flight.is_some();
            if !keep {
                pruned.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        let pruned = pruned.into_inner();
        debug!(cache = self.label(), pruned, "pruned idle entries");
        pruned
    }

    /// Removes every entry (see [`ResourceCache::remove_cache`]).
    pub fn clear(&self) {
        let removed = self.remove_where(|_| true);
        debug!(cache = self.label(), removed, "cache cleared");
    }

    /// Registers a key prefix under invalidation tags and events.
    ///
    /// # Examples
    ///
    /// ```
    /// use resourcache_core::{InvalidationMetadata, ResourceCache};
    ///
    /// let cache = ResourceCache::new();
    /// cache.register_invalidation(
    ///     "workspace:blueprints:",
    ///     InvalidationMetadata::new(vec!["workspace".into()], vec!["blueprint_created".into()]),
    /// );
    /// assert_eq!(cache.invalidate_by_event("blueprint_created"), 0);
    /// ```
    pub fn register_invalidation(&self, prefix: &str, metadata: InvalidationMetadata) {
        self.inner.invalidation.write().register(prefix, metadata);
    }

    /// Removes every entry under the prefixes registered for `tag`.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.apply_invalidation(&InvalidationStrategy::Tag(tag.to_string()))
    }

    /// Removes every entry under the prefixes registered for `event`.
    pub fn invalidate_by_event(&self, event: &str) -> usize {
        self.apply_invalidation(&InvalidationStrategy::Event(event.to_string()))
    }

    /// Removes every entry under the prefixes `strategy` resolves to.
    pub fn apply_invalidation(&self, strategy: &InvalidationStrategy) -> usize {
        let prefixes = self.inner.invalidation.read().resolve(strategy);
        let removed = self.remove_where(|key| prefixes.iter().any(|p| key.starts_with(p.as_str())));
        debug!(cache = self.label(), ?strategy, removed, "invalidation applied");
        removed
    }

    /// Number of entries in the table, mounted or idle.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns true if an entry exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Snapshot of every key in the table, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .entries
            .iter()
            .map(|item| item.key().clone())
            .collect()
    }

    /// Number of live subscriptions to `key` (0 for unknown keys).
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .entries
            .get(key)
            .map_or(0, |slot| slot.lock().subscribers.len())
    }

    /// Returns true while a fetch for `key` is running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner
            .entries
            .get(key)
            .is_some_and(|slot| slot.lock().in_flight.is_some())
    }

    /// Statistics for this cache instance.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    pub(crate) fn unsubscribe(&self, key: &str, slot: &Slot, id: u64) {
        let mut entry = slot.lock();
        entry.subscribers.remove(&id);
        if entry.subscribers.is_empty() && entry.cancel_in_flight() {
            #[cfg(feature = "stats")]
            self.inner.stats.record_cancelled();
            debug!(cache = self.label(), key, "last subscriber left, fetch cancelled");
            entry.notify();
        }
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("name", &self.inner.config.get_name())
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Inner {
    fn label(&self) -> &str {
        self.config.get_name().unwrap_or("default")
    }

    /// Freshness decision plus request collapsing, under the entry lock.
    ///
    /// `join_first` lets an explicit refresh attach to a running fetch before
    /// looking at freshness at all.
    #[allow(clippy::too_many_arguments)]
    fn decide(
        self: &Arc<Self>,
        key: &str,
        slot: &Slot,
        entry: &mut CacheEntry,
        options: &ResourceOptions,
        fetcher: &ErasedFetcher,
        force: bool,
        join_first: bool,
    ) -> Decision {
        let ttl = options.ttl_or(self.config.get_default_ttl());

        if !force {
            if join_first {
                if let Some(in_flight) = &entry.in_flight {
                    #[cfg(feature = "stats")]
                    self.stats.record_deduplicated();
                    trace!(cache = self.label(), key, seq = in_flight.seq, "refresh joining in-flight fetch");
                    return Decision::Joined(in_flight.seq);
                }
            }

            let freshness = entry.freshness(options, ttl, Instant::now());
            if freshness == Freshness::Fresh {
                #[cfg(feature = "stats")]
                self.stats.record_hit();
                trace!(cache = self.label(), key, "serving fresh entry");
                return Decision::Fresh;
            }

            #[cfg(feature = "stats")]
            self.stats.record_miss();

            if let Some(in_flight) = &entry.in_flight {
                if options.same_dependencies(&in_flight.dependencies) {
                    #[cfg(feature = "stats")]
                    self.stats.record_deduplicated();
                    trace!(
                        cache = self.label(),
                        key,
                        seq = in_flight.seq,
                        "joining in-flight fetch"
                    );
                    return Decision::Joined(in_flight.seq);
                }
            }
            debug!(cache = self.label(), key, ?freshness, "fetch needed");
        }

        let seq = self.start_fetch(
            key,
            slot,
            entry,
            options.dependencies_list().to_vec(),
            Arc::clone(fetcher),
            force,
        );
        Decision::Started(seq)
    }

    fn start_fetch(
        self: &Arc<Self>,
        key: &str,
        slot: &Slot,
        entry: &mut CacheEntry,
        dependencies: Vec<Dependency>,
        fetcher: ErasedFetcher,
        forced: bool,
    ) -> u64 {
        if let Some(previous) = entry.in_flight.take() {
            previous.token.cancel();
            #[cfg(feature = "stats")]
            self.stats.record_superseded();
            debug!(
                cache = self.label(),
                key,
                seq = previous.seq,
                "superseding in-flight fetch"
            );
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel::<Settlement>();
        let settled: SettlementFuture = async move { rx.await.unwrap_or(Settlement::Discarded) }
            .boxed()
            .shared();

        entry.last_started = seq;
        entry.in_flight = Some(InFlight {
            seq,
            forced,
            dependencies: dependencies.clone(),
            token: token.clone(),
            settled,
        });
        entry.notify();

        #[cfg(feature = "stats")]
        self.stats.record_fetch();
        debug!(cache = self.label(), key, seq, forced, "starting fetch");

        let inner = Arc::clone(self);
        let slot = Arc::clone(slot);
        let key = key.to_string();
        // The fetcher is invoked on the task, never under the entry lock.
        tokio::spawn(async move {
            let ctx = FetchContext::new(token.clone(), forced);
            // The fetcher is called inside the future so a panic in either
            // the call or the poll is caught and settles the fetch.
            let outcome = match AssertUnwindSafe(async move { fetcher(ctx).await })
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(cache = inner.label(), key = %key, seq, panic = %message, "fetcher panicked");
                    Err(FetchError::request(format!("fetcher panicked: {}", message)))
                }
            };
            let settlement = inner.settle(&key, &slot, seq, &token, dependencies, outcome);
            let _ = tx.send(settlement);
        });

        seq
    }

    fn settle(
        &self,
        key: &str,
        slot: &Slot,
        seq: u64,
        token: &CancellationToken,
        dependencies: Vec<Dependency>,
        outcome: Result<ErasedValue, FetchError>,
    ) -> Settlement {
        let mut entry = slot.lock();
        let current = entry
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.seq == seq);
        if current {
            entry.in_flight = None;
        }

        let cancelled = token.is_cancelled() || matches!(outcome, Err(FetchError::Cancelled));
        let superseded = seq < entry.last_started || seq <= entry.last_settled;
        if cancelled || superseded {
            trace!(
                cache = self.label(),
                key,
                seq,
                cancelled,
                superseded,
                "discarding fetch outcome"
            );
            if current {
                entry.notify();
            }
            return Settlement::Discarded;
        }

        entry.last_settled = seq;
        match &outcome {
            Ok(value) => {
                entry.data = Some(Arc::clone(value));
                entry.data_seq = seq;
                entry.fetched_at = Some(Instant::now());
                entry.updated_at = Some(SystemTime::now());
                entry.dependencies = Some(dependencies);
                entry.invalidated = false;
                entry.error = None;
                debug!(cache = self.label(), key, seq, "fetch settled");
            }
            Err(err) => {
                entry.error = Some(err.clone());
                #[cfg(feature = "stats")]
                self.stats.record_failure();
                warn!(
                    cache = self.label(),
                    key,
                    seq,
                    error = %err,
                    kept_data = entry.data.is_some(),
                    "fetch failed"
                );
            }
        }
        entry.notify();
        Settlement::Applied(outcome)
    }

    /// Awaits a fetch, following newer fetches when it was superseded.
    async fn await_settlement<T>(
        &self,
        key: &str,
        slot: &Slot,
        mut seq: u64,
        mut settled: SettlementFuture,
        origin: Option<&AtomicU64>,
    ) -> Result<Arc<T>, CacheError>
    where
        T: Any + Send + Sync,
    {
        loop {
            match settled.await {
                Settlement::Applied(Ok(value)) => {
                    return value.downcast::<T>().map_err(|_| CacheError::TypeMismatch {
                        key: key.to_string(),
                        expected: std::any::type_name::<T>(),
                    });
                }
                Settlement::Applied(Err(err)) => return Err(CacheError::Fetch(err)),
                Settlement::Discarded => {
                    let entry = slot.lock();
                    match &entry.in_flight {
                        Some(next) if next.seq != seq => {
                            trace!(
                                cache = self.label(),
                                key,
                                from = seq,
                                to = next.seq,
                                "following newer fetch"
                            );
                            seq = next.seq;
                            settled = next.settled.clone();
                            if let Some(origin) = origin {
                                origin.store(seq, Ordering::Release);
                            }
                        }
                        // A newer fetch already settled: report what it left behind.
                        _ if entry.last_settled > seq => {
                            if let Some(err) = &entry.error {
                                return Err(CacheError::Fetch(err.clone()));
                            }
                            return entry
                                .typed_data::<T>()
                                .ok_or(CacheError::Fetch(FetchError::Cancelled));
                        }
                        _ => return Err(CacheError::Fetch(FetchError::Cancelled)),
                    }
                }
            }
        }
    }
}
