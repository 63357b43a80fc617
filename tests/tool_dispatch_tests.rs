//! End-to-end tool dispatch against a two-tier cache
//!
//! Covers the conversational flows: repeated cacheable reads, invalidation
//! after a domain write, unknown tools and invalid parameters.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tool_cache::cache::{CacheConfig, CacheManager, InMemoryStore, ManualClock};
use tool_cache::{
    executor_fn, Dispatcher, FailureKind, FieldError, ParamSpec, ParameterSchema, RegistryError,
    ToolDescriptor, ToolInvocationResult, ToolKind, ToolRegistry, TtlClass,
};

struct Harness {
    dispatcher: Dispatcher,
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    stats_calls: Arc<AtomicUsize>,
    projects_calls: Arc<AtomicUsize>,
}

fn harness() -> Harness {
    let stats_calls = Arc::new(AtomicUsize::new(0));
    let projects_calls = Arc::new(AtomicUsize::new(0));

    let mut registry = ToolRegistry::new();

    let calls = projects_calls.clone();
    registry
        .register(ToolDescriptor::cacheable_read(
            "get_projects",
            "List projects, optionally filtered by status",
            TtlClass::Medium,
            ParameterSchema::new()
                .param(ParamSpec::one_of("status", ["planning", "active", "completed"]))
                .param(ParamSpec::integer("limit").max(50.0).default_value(20)),
            executor_fn(move |_ctx, params| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"projects": [], "limit": params["limit"]}))
                }
            }),
        ))
        .unwrap();

    let calls = stats_calls.clone();
    registry
        .register(
            ToolDescriptor::cacheable_read(
                "get_project_stats",
                "Staffing statistics for one project",
                TtlClass::Long,
                ParameterSchema::new().param(ParamSpec::string("projectId").required()),
                executor_fn(move |_ctx, params| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!({"projectId": params["projectId"], "confirmed": 12, "needed": 3}))
                    }
                }),
            )
            .with_scope("project:{projectId}"),
        )
        .unwrap();

    let clock = ManualClock::starting_now();
    let store = Arc::new(InMemoryStore::new());
    let cache = CacheManager::builder(CacheConfig::testing())
        .clock(Arc::new(clock.clone()))
        .persistent_store(store.clone())
        .build()
        .unwrap();

    Harness {
        dispatcher: Dispatcher::new(Arc::new(registry), Arc::new(cache)),
        store,
        clock,
        stats_calls,
        projects_calls,
    }
}

fn failure(result: ToolInvocationResult) -> (FailureKind, String, Vec<FieldError>) {
    match result {
        ToolInvocationResult::Failure {
            kind,
            message,
            details,
        } => (kind, message, details),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_project_stats_cached_then_invalidated() {
    let h = harness();
    let ctx = h.dispatcher.context().with_user("ops-manager");

    let first = h
        .dispatcher
        .invoke(&ctx, "get_project_stats", json!({"projectId": "p1"}))
        .await;
    let second = h
        .dispatcher
        .invoke(&ctx, "get_project_stats", json!({"projectId": "p1"}))
        .await;

    assert!(first.is_success());
    assert_eq!(first, second);
    assert_eq!(h.stats_calls.load(Ordering::SeqCst), 1);

    let removed = h.dispatcher.cache().invalidate("project:p1:*").await;
    assert_eq!(removed, 1);
    assert_eq!(h.store.row_count(), 0);

    let third = h
        .dispatcher
        .invoke(&ctx, "get_project_stats", json!({"projectId": "p1"}))
        .await;
    assert_eq!(third.data().unwrap()["confirmed"], 12);
    assert_eq!(h.stats_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_tool_touches_no_tier() {
    let h = harness();
    let ctx = h.dispatcher.context();

    let (kind, message, details) = failure(
        h.dispatcher
            .invoke(&ctx, "delete_everything", json!({"confirm": true}))
            .await,
    );

    assert_eq!(kind, FailureKind::UnknownTool);
    assert_eq!(
        message,
        "Unknown tool: delete_everything. Available tools: get_projects, get_project_stats"
    );
    assert!(details.is_empty());

    let stats = h.dispatcher.cache().get_stats().await;
    assert_eq!(stats.requests(), 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(h.store.row_count(), 0);
}

#[tokio::test]
async fn test_missing_project_id_is_invalid() {
    let h = harness();
    let ctx = h.dispatcher.context();

    let (kind, message, details) = failure(
        h.dispatcher
            .invoke(&ctx, "get_project_stats", json!({"project": "p1"}))
            .await,
    );

    assert_eq!(kind, FailureKind::InvalidParameters);
    assert_eq!(message, "Parameter validation failed: projectId: is required");
    assert_eq!(details, vec![FieldError::new("projectId", "is required")]);
    assert_eq!(h.stats_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.dispatcher.cache().get_stats().await.requests(), 0);
}

#[tokio::test]
async fn test_parameter_order_does_not_change_key() {
    let h = harness();
    let ctx = h.dispatcher.context();

    h.dispatcher
        .invoke(&ctx, "get_projects", json!({"status": "active", "limit": 10}))
        .await;
    h.dispatcher
        .invoke(&ctx, "get_projects", json!({"limit": 10, "status": "active"}))
        .await;
    assert_eq!(h.projects_calls.load(Ordering::SeqCst), 1);

    // defaults are part of the key: omitted limit == explicit 20
    h.dispatcher
        .invoke(&ctx, "get_projects", json!({"status": "active"}))
        .await;
    h.dispatcher
        .invoke(&ctx, "get_projects", json!({"status": "active", "limit": 20}))
        .await;
    assert_eq!(h.projects_calls.load(Ordering::SeqCst), 2);

    assert!(h
        .store
        .row(r#"get_projects:{"limit":10,"status":"active"}"#)
        .is_some());
}

#[tokio::test]
async fn test_ttl_class_governs_expiry() {
    let h = harness();
    let ctx = h.dispatcher.context();

    h.dispatcher.invoke(&ctx, "get_projects", Value::Null).await;
    h.dispatcher
        .invoke(&ctx, "get_project_stats", json!({"projectId": "p1"}))
        .await;

    // past the medium class, inside the long one
    h.clock.advance(Duration::from_secs(181));

    h.dispatcher.invoke(&ctx, "get_projects", Value::Null).await;
    h.dispatcher
        .invoke(&ctx, "get_project_stats", json!({"projectId": "p1"}))
        .await;

    assert_eq!(h.projects_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.stats_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_llm_functions_follow_registration_order() {
    let h = harness();

    let functions = h.dispatcher.registry().to_llm_functions();
    let names: Vec<&str> = functions
        .iter()
        .filter_map(|f| f["function"]["name"].as_str())
        .collect();
    assert_eq!(names, vec!["get_projects", "get_project_stats"]);

    let spec = &h.dispatcher.registry().list()[1];
    assert_eq!(spec.parameters["properties"]["projectId"]["type"], "string");

    let tool = h.dispatcher.registry().lookup("get_project_stats").unwrap();
    assert_eq!(tool.kind, ToolKind::CacheableRead { ttl: TtlClass::Long });
}

#[test]
fn test_duplicate_tool_is_fatal_at_startup() {
    let mut registry = ToolRegistry::new();
    let descriptor = || {
        ToolDescriptor::direct_read(
            "get_staff",
            "Staff list",
            ParameterSchema::new(),
            executor_fn(|_ctx, _params| async { Ok(json!([])) }),
        )
    };

    registry.register(descriptor()).unwrap();
    let err = registry.register(descriptor()).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateTool("get_staff".to_string()));
}
