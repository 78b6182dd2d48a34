use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::entry::CacheEntry;
use crate::error::{CacheError, FetchError};
use crate::fetch::ErasedFetcher;
use crate::options::{RefreshOptions, ResourceOptions};
use crate::resource_cache::ResourceCache;

/// What a consumer renders: the last good data plus loading and error flags.
///
/// `error` never clears `data`: after a failed refresh the previous value is
/// still here, next to the error.
pub struct ResourceState<T> {
    pub data: Option<Arc<T>>,
    /// No usable data yet, or a forced refresh is outstanding.
    pub loading: bool,
    pub error: Option<FetchError>,
    /// `data` came from an existing entry rather than from a fetch this
    /// consumer issued or joined.
    pub from_cache: bool,
    pub last_updated: Option<SystemTime>,
}

impl<T> ResourceState<T> {
    /// State of a key the cache has never seen.
    pub fn empty() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            from_cache: false,
            last_updated: None,
        }
    }
}

// Manual impls: `T` itself does not need to be `Clone` or `Debug`.
impl<T> Clone for ResourceState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading,
            error: self.error.clone(),
            from_cache: self.from_cache,
            last_updated: self.last_updated,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceState")
            .field("data", &self.data)
            .field("loading", &self.loading)
            .field("error", &self.error)
            .field("from_cache", &self.from_cache)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// A mounted consumer of one cache key.
///
/// Returned by [`ResourceCache::subscribe`]. Dropping it unregisters the
/// consumer; when the last consumer of a key goes away while a fetch is
/// running, that fetch is cancelled.
pub struct Subscription<T> {
    cache: ResourceCache,
    key: String,
    id: u64,
    slot: Arc<Mutex<CacheEntry>>,
    fetcher: ErasedFetcher,
    options: ResourceOptions,
    /// Sequence number of the fetch this consumer issued or joined (0 = none).
    origin: AtomicU64,
    changes: watch::Receiver<u64>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Subscription<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cache: ResourceCache,
        key: String,
        id: u64,
        slot: Arc<Mutex<CacheEntry>>,
        fetcher: ErasedFetcher,
        options: ResourceOptions,
        origin: Option<u64>,
        changes: watch::Receiver<u64>,
    ) -> Self {
        Self {
            cache,
            key,
            id,
            slot,
            fetcher,
            options,
            origin: AtomicU64::new(origin.unwrap_or(0)),
            changes,
            _payload: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current snapshot of the entry.
    pub fn state(&self) -> ResourceState<T> {
        let origin = match self.origin.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        };
        self.slot.lock().state(origin)
    }

    /// Waits until the entry changes (fetch started, settled, removed).
    ///
    /// Changes that happened since the last call are reported immediately.
    pub async fn changed(&mut self) {
        // The sender lives in the entry this subscription keeps alive.
        let _ = self.changes.changed().await;
    }

    /// Waits until `predicate` holds for the current state and returns it.
    pub async fn wait_for<P>(&mut self, mut predicate: P) -> ResourceState<T>
    where
        P: FnMut(&ResourceState<T>) -> bool,
    {
        loop {
            self.changes.borrow_and_update();
            let state = self.state();
            if predicate(&state) {
                return state;
            }
            self.changed().await;
        }
    }

    /// Waits for the first settled outcome: data or an error.
    pub async fn settled(&mut self) -> ResourceState<T> {
        self.wait_for(|state| !state.loading && (state.data.is_some() || state.error.is_some()))
            .await
    }

    /// Refreshes this key with this consumer's fetcher and options.
    ///
    /// Unlike `subscribe`, failures are returned so that an explicit user
    /// action can report them.
    pub async fn refresh(&self, options: RefreshOptions) -> Result<Arc<T>, CacheError> {
        if !self.options.is_enabled() {
            return Err(CacheError::Disabled(self.key.clone()));
        }
        let cache = self.cache.clone();
        cache
            .refresh_slot::<T>(
                &self.key,
                &self.slot,
                Some((&self.fetcher, &self.options)),
                options.force,
                Some(&self.origin),
            )
            .await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, &self.slot, self.id);
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
