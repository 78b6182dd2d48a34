//! Per-call and per-cache configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dependency::{Dependency, DependencyComparator, ShallowEq};

/// TTL used when neither the call site nor the cache configuration sets one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Options passed with every `subscribe` call.
///
/// # Examples
///
/// ```
/// use resourcache_core::ResourceOptions;
/// use std::time::Duration;
///
/// let options = ResourceOptions::new()
///     .ttl(Duration::from_secs(60))
///     .dependency("42")
///     .enabled(true);
/// assert_eq!(options.ttl_or(Duration::from_secs(30)), Duration::from_secs(60));
/// assert_eq!(options.dependencies_list().len(), 1);
/// ```
#[derive(Clone)]
pub struct ResourceOptions {
    enabled: bool,
    ttl: Option<Duration>,
    dependencies: Vec<Dependency>,
    comparator: Arc<dyn DependencyComparator>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ttl: None,
            dependencies: Vec::new(),
            comparator: Arc::new(ShallowEq),
        }
    }

    /// When `false`, no fetch is issued and the current entry state is
    /// returned as-is. Typically tied to "identity resolved".
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn dependency(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dependency>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the default shallow index-wise comparison.
    pub fn comparator(mut self, comparator: impl DependencyComparator + 'static) -> Self {
        self.comparator = Arc::new(comparator);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl_or(&self, default: Duration) -> Duration {
        self.ttl.unwrap_or(default)
    }

    pub fn dependencies_list(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn same_dependencies(&self, previous: &[Dependency]) -> bool {
        self.comparator.same(previous, &self.dependencies)
    }
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Options for an explicit refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Start a new fetch even when the entry is fresh, cancelling any fetch
    /// already in flight.
    pub force: bool,
}

impl RefreshOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Configuration of a [`ResourceCache`](crate::ResourceCache) instance.
///
/// # Examples
///
/// ```
/// use resourcache_core::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::new()
///     .name("dashboard")
///     .default_ttl(Duration::from_secs(60));
/// assert_eq!(config.get_name(), Some("dashboard"));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    name: Option<String>,
    default_ttl: Duration,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self {
            name: None,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Names the cache. Named caches register their statistics in the
    /// [`stats_registry`](crate::stats_registry) and tag their log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
