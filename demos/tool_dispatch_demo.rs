//! Tool Dispatch Demo Application
//!
//! Wires a registry of staffing tools to a two-tier cache and replays a short
//! conversation: repeated reads, a write, an unknown tool and a bad call.
//!
//! Usage:
//!   cargo run --example tool_dispatch_demo
//!
//! Environment variables (all optional, `.env` is read too):
//!   RUST_LOG                 - log filter (default: info,tool_cache=debug)
//!   TOOL_CACHE_MAX_ENTRIES   - memory tier capacity
//!   TOOL_CACHE_TTL_*_SECS    - TTL class durations
//!   TOOL_CACHE_WRITE_MODE    - inline | background

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tool_cache::{
    executor_fn, start_auto_sweep, CacheConfig, CacheInvalidator, CacheManager, Dispatcher,
    DomainMutation, InMemoryStore, ParamSpec, ParameterSchema, ToolDescriptor, ToolError,
    ToolRegistry, TtlClass,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Project {
    id: String,
    title: String,
    status: String,
    crew_count: u32,
    filled_positions: u32,
}

/// Stand-in for the project database the executors query
#[derive(Clone, Default)]
struct StaffingData {
    projects: Arc<RwLock<HashMap<String, Project>>>,
}

impl StaffingData {
    async fn seed(&self) {
        let mut projects = self.projects.write().await;
        for (id, title, status, crew, filled) in [
            ("p1", "Roadshow Mid Valley", "active", 12, 9),
            ("p2", "Product Launch KLCC", "planning", 8, 8),
            ("p3", "Year End Gala", "completed", 20, 20),
        ] {
            projects.insert(
                id.to_string(),
                Project {
                    id: id.to_string(),
                    title: title.to_string(),
                    status: status.to_string(),
                    crew_count: crew,
                    filled_positions: filled,
                },
            );
        }
    }
}

fn project_json(p: &Project) -> Value {
    json!({
        "id": p.id,
        "title": p.title,
        "status": p.status,
        "crew_count": p.crew_count,
        "filled_positions": p.filled_positions,
    })
}

fn build_registry(data: StaffingData) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let db = data.clone();
    registry.register(ToolDescriptor::cacheable_read(
        "get_projects",
        "Get a list of projects, optionally filtered by status",
        TtlClass::Medium,
        ParameterSchema::new()
            .param(ParamSpec::one_of("status", ["planning", "active", "completed"]).describe("Filter by project status"))
            .param(ParamSpec::integer("limit").max(50.0).default_value(20).coerce()),
        executor_fn(move |_ctx, params| {
            let db = db.clone();
            async move {
                let status = params.get("status").and_then(Value::as_str).map(str::to_string);
                let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;

                let projects = db.projects.read().await;
                let mut list: Vec<&Project> = projects
                    .values()
                    .filter(|p| status.as_deref().map_or(true, |s| p.status == s))
                    .collect();
                list.sort_by(|a, b| a.id.cmp(&b.id));

                let items: Vec<Value> = list.into_iter().take(limit).map(project_json).collect();
                Ok(json!({"count": items.len(), "projects": items}))
            }
        }),
    ))?;

    let db = data.clone();
    registry.register(
        ToolDescriptor::cacheable_read(
            "get_project_stats",
            "Staffing statistics for one project",
            TtlClass::Long,
            ParameterSchema::new().param(ParamSpec::string("projectId").required().describe("The project id")),
            executor_fn(move |_ctx, params| {
                let db = db.clone();
                async move {
                    let id = params.get("projectId").and_then(Value::as_str).unwrap_or_default();
                    let projects = db.projects.read().await;
                    let project = projects
                        .get(id)
                        .ok_or_else(|| ToolError::execution(format!("project {} not found", id)))?;

                    Ok(json!({
                        "projectId": project.id,
                        "staffNeeded": project.crew_count.saturating_sub(project.filled_positions),
                        "fillRate": f64::from(project.filled_positions) / f64::from(project.crew_count.max(1)),
                    }))
                }
            }),
        )
        .with_scope("project:{projectId}"),
    )?;

    let db = data;
    registry.register(
        ToolDescriptor::mutation(
            "update_project_status",
            "Change the status of a project",
            ParameterSchema::new()
                .param(ParamSpec::string("projectId").required())
                .param(ParamSpec::one_of("status", ["planning", "active", "completed"]).required()),
            executor_fn(move |ctx, params| {
                let db = db.clone();
                async move {
                    let id = params.get("projectId").and_then(Value::as_str).unwrap_or_default().to_string();
                    let status = params.get("status").and_then(Value::as_str).unwrap_or_default().to_string();

                    {
                        let mut projects = db.projects.write().await;
                        let project = projects
                            .get_mut(&id)
                            .ok_or_else(|| ToolError::execution(format!("project {} not found", id)))?;
                        project.status = status.clone();
                    }

                    // list views are keyed by status, not by project
                    CacheInvalidator::new(ctx.cache.clone())
                        .apply(&DomainMutation::ProjectUpdated { project_id: id.clone() })
                        .await;
                    ctx.cache.invalidate_tool("get_projects").await;

                    Ok(json!({"projectId": id, "status": status}))
                }
            }),
        )
        .with_scope("project:{projectId}"),
    )?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tool_cache=debug")),
        )
        .init();

    info!("=== Tool Dispatch Demo ===");

    let config = CacheConfig::from_env()?;
    info!("Cache config: {:?}", config);

    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(
        CacheManager::builder(config)
            .persistent_store(store.clone())
            .build()?,
    );
    let sweeper = start_auto_sweep(&cache);

    let data = StaffingData::default();
    data.seed().await;

    let registry = Arc::new(build_registry(data)?);
    info!(
        "Registered tools: {}",
        serde_json::to_string_pretty(&registry.to_llm_functions())?
    );

    let dispatcher = Dispatcher::new(registry, cache.clone());
    let ctx = dispatcher.context().with_user("ops-manager").with_conversation("demo");

    let conversation = vec![
        ("get_projects", json!({"status": "active"})),
        ("get_projects", json!({"status": "active", "limit": "20"})),
        ("get_project_stats", json!({"projectId": "p1"})),
        ("get_project_stats", json!({"projectId": "p1"})),
        ("update_project_status", json!({"projectId": "p1", "status": "completed"})),
        ("get_projects", json!({"status": "active"})),
        ("get_project_stats", json!({"projectId": "p1"})),
        ("delete_everything", json!({})),
        ("get_project_stats", json!({})),
    ];

    for (tool, params) in conversation {
        info!("\n--- {} {} ---", tool, params);
        let result = dispatcher.invoke(&ctx, tool, params).await;
        info!("{}", serde_json::to_string(&result)?);
    }

    cache.flush().await;
    let stats = cache.get_stats().await;
    info!("\n--- Cache statistics ---");
    info!("{}", stats);
    info!("Persistent rows: {}", store.row_count());

    if let Some(handle) = sweeper {
        handle.abort();
    }

    info!("\n=== Demo Complete ===");
    Ok(())
}
