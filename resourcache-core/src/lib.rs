//! # Resourcache Core
//!
//! Core machinery for the resourcache library: a shared, key-addressed
//! resource cache that data consumers build on.
//!
//! ## Features
//!
//! - **Request de-duplication**: at most one fetch in flight per key; every
//!   concurrent consumer shares its outcome
//! - **TTL freshness**: entries older than their time-to-live are refetched
//! - **Dependency invalidation**: a changed dependency list refetches even
//!   inside the TTL window
//! - **Stale-while-error**: a failed refresh keeps the last good data visible
//! - **Newest start wins**: a slow, older response never overwrites a newer one
//! - **Cancellation**: when the last consumer leaves, the running fetch's
//!   token is cancelled
//! - **Mutation invalidation**: remove single keys, prefixes, or everything
//!   registered under a tag or event
//! - **Statistics**: hit/miss and fetch counters (with the `stats` feature)
//!
//! ## Module Organization
//!
//! - [`ResourceCache`] - the cache table and its operations
//! - [`Subscription`] / [`ResourceState`] - a mounted consumer and what it renders
//! - [`ResourceOptions`] / [`CacheConfig`] - per-call and per-cache configuration
//! - [`Dependency`] / [`DependencyComparator`] - dependency lists and their equality
//! - [`FetchContext`] - what a fetcher receives (cancellation token, force flag)
//! - [`invalidation`] - tag and event driven invalidation
//! - [`keys`] - cache key generation
//!
mod dependency;
mod entry;
mod error;
mod fetch;
mod options;
mod resource_cache;
mod subscription;

pub mod invalidation;
pub mod keys;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use dependency::{Dependency, DependencyComparator, ShallowEq};
pub use error::{CacheError, FetchError};
pub use fetch::FetchContext;
pub use invalidation::{InvalidationMetadata, InvalidationRegistry, InvalidationStrategy};
pub use keys::{filter_hash, CacheableKey, DefaultCacheableKey, ResourceKey};
pub use options::{CacheConfig, RefreshOptions, ResourceOptions, DEFAULT_TTL};
pub use resource_cache::ResourceCache;
pub use subscription::{ResourceState, Subscription};

#[cfg(feature = "stats")]
pub use stats::CacheStats;

pub use tokio_util::sync::CancellationToken;
