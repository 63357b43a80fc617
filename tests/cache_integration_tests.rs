//! Integration tests for the cache module
//!
//! These tests verify the complete cache functionality including:
//! - Key determinism
//! - TTL expiration on both tiers
//! - No caching of failed producers
//! - Invalidation across both tiers
//! - Persistent tier outages
//! - Hit rate accounting

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tool_cache::cache::{
    derive_key, hash_params, CacheConfig, CacheInvalidator, CacheManager, CacheRequest,
    DomainMutation, InMemoryStore, KeyBuilder, ManualClock, WriteMode,
};

const MEDIUM: Duration = Duration::from_secs(180);

fn two_tier(config: CacheConfig) -> (Arc<CacheManager>, Arc<InMemoryStore>, ManualClock) {
    let clock = ManualClock::starting_now();
    let store = Arc::new(InMemoryStore::new());
    let cache = CacheManager::builder(config)
        .clock(Arc::new(clock.clone()))
        .persistent_store(store.clone())
        .build()
        .unwrap();
    (Arc::new(cache), store, clock)
}

async fn fill(cache: &CacheManager, key: &str, value: Value) {
    let result = cache
        .get_or_set(key, move || async move { Ok::<_, String>(value) }, MEDIUM)
        .await;
    assert_ok!(result);
}

#[test]
fn test_key_determinism() {
    let a = derive_key("get_projects", &json!({"status": "active", "limit": 20})).unwrap();
    let b = derive_key("get_projects", &json!({"limit": 20, "status": "active"})).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, r#"get_projects:{"limit":20,"status":"active"}"#);

    let nested_a = json!({"filter": {"to": "2024-02-01", "from": "2024-01-01"}, "page": 1});
    let nested_b = json!({"page": 1, "filter": {"from": "2024-01-01", "to": "2024-02-01"}});
    assert_eq!(
        derive_key("search", &nested_a).unwrap(),
        derive_key("search", &nested_b).unwrap()
    );
    assert_eq!(hash_params(&nested_a).unwrap(), hash_params(&nested_b).unwrap());

    let c = derive_key("get_projects", &json!({"status": "completed", "limit": 20})).unwrap();
    assert_ne!(a, c);
}

#[test]
fn test_entity_keys() {
    let key = KeyBuilder::new("projects").segment("list").segment_or_all(None).build();
    assert_eq!(key, "projects:list:all");

    let pattern = KeyBuilder::new("project").segment("p1").wildcard();
    assert_eq!(pattern, "project:p1:*");
}

#[tokio::test]
async fn test_ttl_expiry_across_tiers() {
    let (cache, store, clock) = two_tier(CacheConfig::testing());
    let calls = Arc::new(AtomicUsize::new(0));

    let produce = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(json!({"count": 3}))
        }
    };

    cache
        .get_or_set("project:p1:stats", produce(calls.clone()), MEDIUM)
        .await
        .unwrap();

    // lost from memory, still live in the persistent tier
    cache.memory().clear().await;
    clock.advance(Duration::from_secs(179));
    cache
        .get_or_set("project:p1:stats", produce(calls.clone()), MEDIUM)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(1));
    cache
        .get_or_set("project:p1:stats", produce(calls.clone()), MEDIUM)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.row("project:p1:stats").unwrap().hit_count, 1);
}

#[tokio::test]
async fn test_no_negative_caching() {
    let (cache, store, _clock) = two_tier(CacheConfig::testing());

    let result = cache
        .get_or_set(
            "staff:s1:schedule",
            || async { Err::<Value, _>("database timeout".to_string()) },
            MEDIUM,
        )
        .await;
    assert_err!(result);
    assert_eq!(store.row_count(), 0);

    let counter = AtomicUsize::new(0);
    let calls = &counter;
    let value = cache
        .get_or_set(
            "staff:s1:schedule",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!(["2024-03-01"]))
            },
            MEDIUM,
        )
        .await
        .unwrap();

    assert_eq!(value, json!(["2024-03-01"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidation_across_tiers() {
    let (cache, store, _clock) = two_tier(CacheConfig::testing());

    fill(&cache, "projects:list:active", json!([1])).await;
    fill(&cache, "projects:list:all", json!([1, 2])).await;
    fill(&cache, "project:p1:stats", json!({})).await;

    let removed = cache.invalidate("projects:list:*").await;
    assert_eq!(removed, 2);

    // a second process sharing the store sees the deletion too
    let other = CacheManager::builder(CacheConfig::testing())
        .persistent_store(store.clone())
        .build()
        .unwrap();
    assert!(other.get("projects:list:active").await.is_none());
    assert!(other.get("project:p1:stats").await.is_some());
}

#[tokio::test]
async fn test_invalidation_waits_for_queued_writes() {
    let config = CacheConfig::builder()
        .write_mode(WriteMode::Background)
        .enable_auto_sweep(false)
        .build();
    let (cache, store, _clock) = two_tier(config);

    fill(&cache, "projects:list:all", json!([])).await;
    cache.invalidate("projects:list:*").await;
    cache.flush().await;

    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn test_domain_mutation_invalidation() {
    let (cache, _store, _clock) = two_tier(CacheConfig::testing());

    fill(&cache, "project:p1:stats", json!({})).await;
    fill(&cache, "project:p1:expenses:2024", json!([])).await;
    fill(&cache, "project:p2:stats", json!({})).await;
    fill(&cache, "analytics:expense:monthly", json!({})).await;
    fill(&cache, "analytics:payment:monthly", json!({})).await;

    let invalidator = CacheInvalidator::new(cache.clone());
    let event = invalidator
        .apply(&DomainMutation::ExpenseUpdated {
            project_id: "p1".to_string(),
        })
        .await;

    assert_eq!(event.memory_removed, 2);
    assert_eq!(event.persistent_removed, 2);
    assert!(cache.get("project:p1:stats").await.is_some());
    assert!(cache.get("analytics:payment:monthly").await.is_some());

    invalidator.on_payment_created("p1").await;
    assert!(cache.get("project:p1:stats").await.is_none());
    assert!(cache.get("project:p2:stats").await.is_some());
}

#[tokio::test]
async fn test_persistent_outage_is_transparent() {
    let (cache, store, _clock) = two_tier(CacheConfig::testing());
    store.set_available(false);

    fill(&cache, "user:u1", json!({"name": "Aina"})).await;
    assert_eq!(cache.get("user:u1").await, Some(json!({"name": "Aina"})));
    assert_eq!(cache.invalidate("user:*").await, 1);

    store.set_available(true);
    let stats = cache.get_stats().await;
    assert_eq!(stats.errors, 3);
}

#[tokio::test]
async fn test_invalidation_during_outage_is_not_undone() {
    let (cache, store, _clock) = two_tier(CacheConfig::testing());
    fill(&cache, "projects:list:active", json!("OLD")).await;

    store.set_available(false);
    cache.invalidate("projects:list:*").await;
    store.set_available(true);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let value = cache
        .get_or_set(
            "projects:list:active",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!("NEW"))
            },
            MEDIUM,
        )
        .await
        .unwrap();

    assert_eq!(value, json!("NEW"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.pending_invalidations().await, 0);
}

#[tokio::test]
async fn test_batch_operations_and_key_listing() {
    let (cache, store, _clock) = two_tier(CacheConfig::testing());

    cache
        .set_many(vec![
            ("project:p1:staff", json!(["s1"]), MEDIUM),
            ("project:p2:staff", json!(["s2"]), MEDIUM),
        ])
        .await;

    assert_eq!(
        cache.get_many(&["project:p1:staff", "project:p9:staff"]).await,
        vec![Some(json!(["s1"])), None]
    );
    assert_eq!(cache.keys("project:*:staff").await.len(), 2);

    let result = cache
        .write_through(
            "user:u1",
            json!({"role": "admin"}),
            |_value| async { Ok::<_, String>(()) },
            MEDIUM,
        )
        .await;
    assert_ok!(result);
    assert!(store.row("user:u1").is_some());
}

#[tokio::test]
async fn test_hit_rate_arithmetic() {
    let (cache, _store, _clock) = two_tier(CacheConfig::testing());

    fill(&cache, "a", json!(1)).await;
    fill(&cache, "b", json!(2)).await;
    for _ in 0..6 {
        fill(&cache, "a", json!(1)).await;
    }

    let stats = cache.get_stats().await;
    assert_eq!(stats.hits, 6);
    assert_eq!(stats.misses, 2);
    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_concurrent_misses_tolerate_duplicate_work() {
    let (cache, _store, _clock) = two_tier(CacheConfig::testing());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_set(
                    "candidates:list:all",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(json!(["c1", "c2"]))
                    },
                    MEDIUM,
                )
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!(["c1", "c2"]));
    }

    let calls = calls.load(Ordering::SeqCst);
    assert!((1..=8).contains(&calls));
    assert_eq!(cache.memory().len().await, 1);
}

#[tokio::test]
async fn test_tagged_tool_request() {
    let (cache, store, _clock) = two_tier(CacheConfig::testing());

    let request = CacheRequest::for_tool("get_project_stats", &json!({"projectId": "p1"}), MEDIUM)
        .unwrap()
        .with_tags(vec!["project:p1:get_project_stats".to_string()]);
    let key = request.key.clone();

    cache
        .get_or_set_request(request, || async { Ok::<_, String>(json!({"staff": 4})) })
        .await
        .unwrap();

    let row = store.row(&key).unwrap();
    assert_eq!(row.tool_name, "get_project_stats");
    assert_eq!(row.tags, vec!["project:p1:get_project_stats".to_string()]);

    assert_eq!(cache.invalidate("project:p1:*").await, 1);
    assert!(store.row(&key).is_none());
}
