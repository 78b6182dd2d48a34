use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::dependency::Dependency;
use crate::error::{CacheError, FetchError};
use crate::fetch::{ErasedFetcher, ErasedValue, InFlight};
use crate::options::ResourceOptions;
use crate::subscription::ResourceState;

/// Why an entry needs (or does not need) a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    /// Inside the TTL window with unchanged dependencies.
    Fresh,
    /// No data has ever been accepted for this key.
    Cold,
    /// The dependency list differs from the one the data was fetched with.
    DependenciesChanged,
    /// Older than its TTL.
    Expired,
    /// Explicitly marked stale with `invalidate`.
    Invalidated,
}

/// The record kept for one cache key.
///
/// The payload is stored type-erased so that every data domain shares one
/// table. The entry is bound to the payload type it was created with.
pub(crate) struct CacheEntry {
    type_id: TypeId,
    type_name: &'static str,

    pub(crate) data: Option<ErasedValue>,
    /// Sequence number of the fetch that produced `data`.
    pub(crate) data_seq: u64,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) updated_at: Option<SystemTime>,
    /// Dependencies `data` was fetched with.
    pub(crate) dependencies: Option<Vec<Dependency>>,
    pub(crate) invalidated: bool,
    pub(crate) error: Option<FetchError>,

    pub(crate) in_flight: Option<InFlight>,
    /// Newest sequence number started for this key.
    pub(crate) last_started: u64,
    /// Newest sequence number whose outcome was written.
    pub(crate) last_settled: u64,

    pub(crate) subscribers: HashSet<u64>,
    pub(crate) fetcher: Option<ErasedFetcher>,
    pub(crate) options: ResourceOptions,
    version: watch::Sender<u64>,
}

impl CacheEntry {
    pub(crate) fn new<T: Any>() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            data: None,
            data_seq: 0,
            fetched_at: None,
            updated_at: None,
            dependencies: None,
            invalidated: false,
            error: None,
            in_flight: None,
            last_started: 0,
            last_settled: 0,
            subscribers: HashSet::new(),
            fetcher: None,
            options: ResourceOptions::default(),
            version,
        }
    }

    pub(crate) fn check_type<T: Any>(&self, key: &str) -> Result<(), CacheError> {
        if self.type_id == TypeId::of::<T>() {
            Ok(())
        } else {
            tracing::debug!(key, stored = self.type_name(), "payload type mismatch");
            Err(CacheError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Runs the freshness decision for a caller with `options`.
    ///
    /// Order matters: a cold entry always fetches, a dependency change wins
    /// over a remaining TTL, and the TTL is checked last.
    pub(crate) fn freshness(&self, options: &ResourceOptions, ttl: Duration, now: Instant) -> Freshness {
        let Some(fetched_at) = self.fetched_at else {
            return Freshness::Cold;
        };
        if self.data.is_none() {
            return Freshness::Cold;
        }
        if let Some(previous) = &self.dependencies {
            if !options.same_dependencies(previous) {
                return Freshness::DependenciesChanged;
            }
        }
        if now.saturating_duration_since(fetched_at) > ttl {
            return Freshness::Expired;
        }
        if self.invalidated {
            return Freshness::Invalidated;
        }
        Freshness::Fresh
    }

    pub(crate) fn typed_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data
            .clone()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Snapshot for a consumer whose own fetch (if any) is `origin`.
    pub(crate) fn state<T: Any + Send + Sync>(&self, origin: Option<u64>) -> ResourceState<T> {
        let data = self.typed_data::<T>();
        let loading = self
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| self.data.is_none() || in_flight.forced);
        let from_cache = data.is_some() && origin.map_or(true, |seq| self.data_seq < seq);
        ResourceState {
            data,
            loading,
            error: self.error.clone(),
            from_cache,
            last_updated: self.updated_at,
        }
    }

    /// Cancels the running fetch, if any. Returns whether one was running.
    pub(crate) fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                in_flight.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops everything the entry learned, keeping only its subscribers.
    pub(crate) fn reset(&mut self) {
        self.cancel_in_flight();
        self.data = None;
        self.data_seq = 0;
        self.fetched_at = None;
        self.updated_at = None;
        self.dependencies = None;
        self.invalidated = false;
        self.error = None;
        self.notify();
    }

    pub(crate) fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Wakes every subscriber waiting for a change.
    pub(crate) fn notify(&self) {
        self.version.send_modify(|version| *version = version.wrapping_add(1));
    }
}
