//! Cache key generation.
//!
//! Keys are opaque to the cache. By convention consumers build them as
//! `"<domain>:<entity>:<id>:<filterHash>"` with [`ResourceKey`], folding in
//! identity (freelancer id, workspace id) and filter state.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

/// Types that can render themselves as part of a cache key.
pub trait CacheableKey {
    fn to_cache_key(&self) -> String;
}

/// Marker trait: derive the key from the `Debug` representation.
///
/// Convenient for filter structs; implement [`CacheableKey`] directly when the
/// `Debug` output is large or unstable.
///
/// # Examples
///
/// ```
/// use resourcache_core::{CacheableKey, DefaultCacheableKey};
///
/// #[derive(Debug)]
/// struct OrderFilters {
///     status: &'static str,
/// }
///
/// impl DefaultCacheableKey for OrderFilters {}
///
/// let filters = OrderFilters { status: "open" };
/// assert_eq!(filters.to_cache_key(), "OrderFilters { status: \"open\" }");
/// ```
pub trait DefaultCacheableKey: Debug {}

impl<T: DefaultCacheableKey + ?Sized> CacheableKey for T {
    fn to_cache_key(&self) -> String {
        format!("{:?}", self)
    }
}

impl DefaultCacheableKey for u8 {}
impl DefaultCacheableKey for u16 {}
impl DefaultCacheableKey for u32 {}
impl DefaultCacheableKey for u64 {}
impl DefaultCacheableKey for usize {}
impl DefaultCacheableKey for i32 {}
impl DefaultCacheableKey for i64 {}
impl DefaultCacheableKey for bool {}
impl<T: Debug> DefaultCacheableKey for Option<T> {}
impl<T: Debug> DefaultCacheableKey for Vec<T> {}
impl<T: Debug> DefaultCacheableKey for [T] {}

// Strings render without the Debug quotes so that `"42"` and `42` produce the
// same key segment.
impl CacheableKey for str {
    fn to_cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheableKey for String {
    fn to_cache_key(&self) -> String {
        self.clone()
    }
}

/// Builder for conventional `"<domain>:<entity>:<id>:<filterHash>"` keys.
///
/// # Examples
///
/// ```
/// use resourcache_core::ResourceKey;
///
/// let key = ResourceKey::new("freelancer")
///     .segment("portfolio")
///     .segment(&42u64)
///     .build();
/// assert_eq!(key, "freelancer:portfolio:42");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceKey {
    segments: Vec<String>,
}

impl ResourceKey {
    pub fn new(domain: &str) -> Self {
        Self {
            segments: vec![domain.to_string()],
        }
    }

    /// Appends one segment. Strings and numbers render bare.
    pub fn segment<K: CacheableKey + ?Sized>(mut self, part: &K) -> Self {
        self.segments.push(part.to_cache_key());
        self
    }

    /// Appends a short, stable hash of the filter state.
    pub fn filters<K: CacheableKey + ?Sized>(mut self, filters: &K) -> Self {
        self.segments.push(filter_hash(filters));
        self
    }

    pub fn build(self) -> String {
        self.segments.join(":")
    }
}

/// Hex hash of a filter value's cache key.
pub fn filter_hash<K: CacheableKey + ?Sized>(filters: &K) -> String {
    let mut hasher = DefaultHasher::new();
    filters.to_cache_key().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
