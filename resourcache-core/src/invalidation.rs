//! # Cache Invalidation
//!
//! Mutation-driven invalidation beyond TTL expiry and single-key removal.
//!
//! After a create/update/delete, a consumer usually knows *what kind* of
//! data changed, not every key that holds it. The registry maps key prefixes
//! to:
//!
//! - **Tags**: group related prefixes and drop them together
//!   (`"workspace"` → blueprints, experience settings, ...).
//! - **Events**: named mutations (`"blueprint_created"`) that drop every
//!   prefix they affect.
//!
//! Every [`ResourceCache`](crate::ResourceCache) owns a registry; see
//! [`ResourceCache::register_invalidation`](crate::ResourceCache::register_invalidation).
//!
//! # Examples
//!
//! ```rust
//! use resourcache_core::invalidation::{InvalidationMetadata, InvalidationRegistry};
//!
//! let mut registry = InvalidationRegistry::new();
//! registry.register(
//!     "workspace:blueprints:",
//!     InvalidationMetadata::new(vec!["workspace".to_string()], vec!["blueprint_created".to_string()]),
//! );
//!
//! assert_eq!(registry.prefixes_for_event("blueprint_created"), vec!["workspace:blueprints:"]);
//! assert!(registry.prefixes_for_tag("orders").is_empty());
//! ```

use std::collections::{HashMap, HashSet};

/// Strategy for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationStrategy {
    /// Invalidate every prefix registered under a tag
    Tag(String),
    /// Invalidate every prefix affected by an event
    Event(String),
    /// Invalidate one key prefix directly
    Prefix(String),
}

/// Tags and events registered for one key prefix.
#[derive(Debug, Clone, Default)]
pub struct InvalidationMetadata {
    pub tags: Vec<String>,
    pub events: Vec<String>,
}

impl InvalidationMetadata {
    pub fn new(tags: Vec<String>, events: Vec<String>) -> Self {
        Self { tags, events }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.events.is_empty()
    }
}

/// Maps tags and events to the key prefixes they invalidate.
#[derive(Debug, Default)]
pub struct InvalidationRegistry {
    tag_to_prefixes: HashMap<String, HashSet<String>>,
    event_to_prefixes: HashMap<String, HashSet<String>>,
    prefix_metadata: HashMap<String, InvalidationMetadata>,
}

impl InvalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key prefix with its tags and events.
    ///
    /// Registering the same prefix again adds to its tags and events.
    pub fn register(&mut self, prefix: &str, metadata: InvalidationMetadata) {
        for tag in &metadata.tags {
            self.tag_to_prefixes
                .entry(tag.clone())
                .or_default()
                .insert(prefix.to_string());
        }
        for event in &metadata.events {
            self.event_to_prefixes
                .entry(event.clone())
                .or_default()
                .insert(prefix.to_string());
        }

        let stored = self.prefix_metadata.entry(prefix.to_string()).or_default();
        stored.tags.extend(metadata.tags);
        stored.events.extend(metadata.events);
    }

    /// Forget a prefix and every tag/event link to it.
    pub fn unregister(&mut self, prefix: &str) -> bool {
        let Some(metadata) = self.prefix_metadata.remove(prefix) else {
            return false;
        };
        for tag in &metadata.tags {
            remove_link(&mut self.tag_to_prefixes, tag, prefix);
        }
        for event in &metadata.events {
            remove_link(&mut self.event_to_prefixes, event, prefix);
        }
        true
    }

    pub fn prefixes_for_tag(&self, tag: &str) -> Vec<String> {
        sorted(self.tag_to_prefixes.get(tag))
    }

    pub fn prefixes_for_event(&self, event: &str) -> Vec<String> {
        sorted(self.event_to_prefixes.get(event))
    }

    /// Prefixes a strategy resolves to.
    pub fn resolve(&self, strategy: &InvalidationStrategy) -> Vec<String> {
        match strategy {
            InvalidationStrategy::Tag(tag) => self.prefixes_for_tag(tag),
            InvalidationStrategy::Event(event) => self.prefixes_for_event(event),
            InvalidationStrategy::Prefix(prefix) => vec![prefix.clone()],
        }
    }

    pub fn metadata(&self, prefix: &str) -> Option<&InvalidationMetadata> {
        self.prefix_metadata.get(prefix)
    }

    /// Clear all registrations
    pub fn clear(&mut self) {
        self.tag_to_prefixes.clear();
        self.event_to_prefixes.clear();
        self.prefix_metadata.clear();
    }
}

fn remove_link(map: &mut HashMap<String, HashSet<String>>, name: &str, prefix: &str) {
    if let Some(prefixes) = map.get_mut(name) {
        prefixes.remove(prefix);
        if prefixes.is_empty() {
            map.remove(name);
        }
    }
}

fn sorted(prefixes: Option<&HashSet<String>>) -> Vec<String> {
    let mut out: Vec<String> = prefixes
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default();
    out.sort();
    out
}
