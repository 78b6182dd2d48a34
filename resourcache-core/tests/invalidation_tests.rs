mod common;

use common::{counting, settle_tasks};
use resourcache_core::{
    InvalidationMetadata, InvalidationStrategy, ResourceCache, ResourceOptions,
};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

async fn warm(cache: &ResourceCache, keys: &[&str]) {
    let calls = Arc::new(AtomicUsize::new(0));
    for key in keys {
        let mut sub = cache
            .subscribe(*key, counting(&calls, key), ResourceOptions::new())
            .unwrap();
        sub.settled().await;
    }
}

#[tokio::test]
async fn test_remove_by_prefix() {
    let cache = ResourceCache::new();
    warm(
        &cache,
        &["freelancer:orders:1", "freelancer:orders:2", "freelancer:portfolio:1"],
    )
    .await;

    assert_eq!(cache.remove_by_prefix("freelancer:orders:"), 2);
    assert_eq!(cache.keys(), vec!["freelancer:portfolio:1".to_string()]);
    assert_eq!(cache.remove_by_prefix("freelancer:orders:"), 0);
}

#[tokio::test]
async fn test_invalidate_by_event() {
    let cache = ResourceCache::new();
    cache.register_invalidation(
        "workspace:blueprints:",
        InvalidationMetadata::new(vec![], vec!["blueprint_created".to_string()]),
    );
    warm(
        &cache,
        &["workspace:blueprints:1", "workspace:blueprints:2", "workspace:settings:1"],
    )
    .await;

    assert_eq!(cache.invalidate_by_event("blueprint_created"), 2);
    assert!(cache.contains_key("workspace:settings:1"));
    assert_eq!(cache.invalidate_by_event("unregistered_event"), 0);
}

#[tokio::test]
async fn test_invalidate_by_tag() {
    let cache = ResourceCache::new();
    let workspace = InvalidationMetadata::new(vec!["workspace".to_string()], vec![]);
    cache.register_invalidation("workspace:blueprints:", workspace.clone());
    cache.register_invalidation("workspace:settings:", workspace);
    warm(
        &cache,
        &["workspace:blueprints:1", "workspace:settings:1", "freelancer:showcase:1"],
    )
    .await;

    assert_eq!(cache.invalidate_by_tag("workspace"), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains_key("freelancer:showcase:1"));
}

#[tokio::test]
async fn test_apply_prefix_strategy() {
    let cache = ResourceCache::new();
    warm(&cache, &["freelancer:orders:1", "workspace:settings:1"]).await;

    let removed =
        cache.apply_invalidation(&InvalidationStrategy::Prefix("workspace:".to_string()));
    assert_eq!(removed, 1);
    assert!(cache.contains_key("freelancer:orders:1"));
}

#[tokio::test]
async fn test_mounted_entries_survive_as_empty_slots() {
    let cache = ResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    cache.register_invalidation(
        "workspace:",
        InvalidationMetadata::new(vec!["workspace".to_string()], vec![]),
    );

    let mut mounted = cache
        .subscribe("workspace:settings:3", counting(&calls, "s"), ResourceOptions::new())
        .unwrap();
    mounted.settled().await;

    assert_eq!(cache.invalidate_by_tag("workspace"), 1);
    assert!(cache.contains_key("workspace:settings:3"));
    assert!(mounted.state().data.is_none());
}

#[tokio::test]
async fn test_prune_idle_and_clear() {
    let cache = ResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    warm(&cache, &["freelancer:orders:1", "freelancer:orders:2"]).await;

    let mut mounted = cache
        .subscribe("freelancer:portfolio:1", counting(&calls, "p"), ResourceOptions::new())
        .unwrap();
    mounted.settled().await;

    assert_eq!(cache.prune_idle(), 2);
    assert_eq!(cache.keys(), vec!["freelancer:portfolio:1".to_string()]);

    cache.clear();
    assert!(mounted.state().data.is_none());
    drop(mounted);
    settle_tasks().await;
    assert_eq!(cache.prune_idle(), 1);
    assert!(cache.is_empty());
}
