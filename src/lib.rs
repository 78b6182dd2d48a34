//! # Resourcache
//!
//! A shared, key-addressed resource cache for async data consumers.
//!
//! Every data domain of an application (order pipeline, portfolio, showcase,
//! project blueprints, workspace settings, ...) reads through one cache:
//!
//! - concurrent reads of the same key collapse into a single fetch,
//! - data is reused by every consumer of a key until its TTL expires or its
//!   dependencies change,
//! - a failed refresh keeps the last good data next to the error,
//! - mutations drop the keys they affect so the next read refetches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resourcache::{FetchContext, FetchError, ResourceKey, ResourceOptions};
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone)]
//! struct Portfolio {
//!     items: Vec<String>,
//! }
//!
//! async fn load_portfolio(_ctx: FetchContext, id: u64) -> Result<Portfolio, FetchError> {
//!     Ok(Portfolio { items: vec![format!("item-{}", id)] })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), resourcache::CacheError> {
//!     let key = ResourceKey::new("freelancer").segment("portfolio").segment(&42u64).build();
//!
//!     let mut portfolio = resourcache::global().subscribe(
//!         key,
//!         |ctx| load_portfolio(ctx, 42),
//!         ResourceOptions::new().ttl(Duration::from_secs(60)).dependency(42u64),
//!     )?;
//!
//!     let state = portfolio.settled().await;
//!     println!("{:?} (from cache: {})", state.data, state.from_cache);
//!     Ok(())
//! }
//! ```
//!
//! ## Independent Instances
//!
//! [`global()`] is the shared instance for application wiring. Tests and
//! isolated components build their own with [`ResourceCache::new`] or
//! [`ResourceCache::with_config`]; instances never share entries.
//!
//! ## Invalidation After Mutations
//!
//! ```rust
//! use resourcache::{InvalidationMetadata, ResourceCache};
//!
//! let cache = ResourceCache::new();
//! cache.register_invalidation(
//!     "workspace:blueprints:",
//!     InvalidationMetadata::new(vec![], vec!["blueprint_created".to_string()]),
//! );
//!
//! // After a successful "create blueprint" request:
//! cache.invalidate_by_event("blueprint_created");
//! ```

use once_cell::sync::Lazy;

pub use resourcache_core::*;

static GLOBAL: Lazy<ResourceCache> = Lazy::new(|| {
    tracing::debug!("initializing shared resource cache");
    ResourceCache::with_config(CacheConfig::new().name("global"))
});

/// The process-wide shared cache.
///
/// Created on first use and alive for the rest of the process.
pub fn global() -> &'static ResourceCache {
    &GLOBAL
}

/// Remove `key` from the shared cache.
///
/// # Returns
///
/// `true` if an entry existed
///
/// # Examples
///
/// ```rust
/// // After updating a portfolio:
/// resourcache::remove_cache("freelancer:portfolio:42");
/// ```
pub fn remove_cache(key: &str) -> bool {
    GLOBAL.remove_cache(key)
}

/// Remove every key starting with `prefix` from the shared cache.
///
/// # Returns
///
/// The number of entries removed
pub fn remove_by_prefix(prefix: &str) -> usize {
    GLOBAL.remove_by_prefix(prefix)
}

/// Invalidate all shared-cache prefixes associated with a specific tag
///
/// # Returns
///
/// The number of entries removed
///
/// # Examples
///
/// ```rust
/// use resourcache::{global, invalidate_by_tag, InvalidationMetadata};
///
/// global().register_invalidation(
///     "workspace:",
///     InvalidationMetadata::new(vec!["workspace".to_string()], vec![]),
/// );
///
/// // Later, when the active workspace changes:
/// invalidate_by_tag("workspace");
/// ```
pub fn invalidate_by_tag(tag: &str) -> usize {
    GLOBAL.invalidate_by_tag(tag)
}

/// Invalidate all shared-cache prefixes affected by a specific event
///
/// # Returns
///
/// The number of entries removed
pub fn invalidate_by_event(event: &str) -> usize {
    GLOBAL.invalidate_by_event(event)
}

/// Register a key prefix of the shared cache under invalidation tags and events.
pub fn register_invalidation(prefix: &str, metadata: InvalidationMetadata) {
    GLOBAL.register_invalidation(prefix, metadata)
}
