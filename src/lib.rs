//! # Tool Cache (tool-cache)
//!
//! A two-tier query result cache and the tool-dispatch core of an LLM
//! assistant over a staffing and project database.
//!
//! ## Features
//!
//! - Deterministic cache keys from tool name + canonical parameters
//! - Process-local memory tier backed by a shared persistent tier
//! - TTL classes (short / medium / long) chosen per tool
//! - Pattern invalidation across both tiers, driven by domain writes
//! - Typed tool registry with parameter validation and function-calling export
//! - Dispatcher that reads through the cache for cacheable tools
//!
//! ## Cache Manager
//!
//! Data-access services wrap their queries with [`CacheManager::get_or_set`]:
//!
//! ```no_run
//! use tool_cache::{CacheConfig, CacheManager, InMemoryStore, TtlClass};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheManager::builder(CacheConfig::from_env()?)
//!         .persistent_store(Arc::new(InMemoryStore::new()))
//!         .build()?;
//!
//!     let ttl = cache.ttl_for(TtlClass::Medium).unwrap_or_default();
//!     let projects = cache
//!         .get_or_set(
//!             "projects:list:active",
//!             || async { Ok::<_, anyhow::Error>(json!([{"id": "p1"}])) },
//!             ttl,
//!         )
//!         .await?;
//!     println!("{}", projects);
//!
//!     cache.invalidate("projects:list:*").await;
//!     Ok(())
//! }
//! ```
//!
//! ## Tool Dispatch
//!
//! ```no_run
//! use tool_cache::{
//!     executor_fn, CacheConfig, CacheManager, Dispatcher, ParamSpec, ParameterSchema,
//!     ToolDescriptor, ToolRegistry, TtlClass,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = ToolRegistry::new();
//!     registry.register(
//!         ToolDescriptor::cacheable_read(
//!             "get_project_stats",
//!             "Staffing statistics for one project",
//!             TtlClass::Long,
//!             ParameterSchema::new().param(ParamSpec::string("projectId").required()),
//!             executor_fn(|_ctx, params| async move {
//!                 Ok(json!({"projectId": params["projectId"], "staff": 4}))
//!             }),
//!         )
//!         .with_scope("project:{projectId}"),
//!     )?;
//!
//!     let cache = Arc::new(CacheManager::new(CacheConfig::default()));
//!     let dispatcher = Dispatcher::new(Arc::new(registry), cache);
//!
//!     let ctx = dispatcher.context().with_user("user-1");
//!     let result = dispatcher
//!         .invoke(&ctx, "get_project_stats", json!({"projectId": "p1"}))
//!         .await;
//!     println!("{}", serde_json::to_string(&result)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod tools;

// Re-export main types for convenience
pub use cache::{
    start_auto_sweep, CacheConfig, CacheConfigBuilder, CacheInvalidator, CacheKey, CacheManager,
    CacheRequest, CacheStats, CacheValue, DomainMutation, InMemoryStore, KeyBuilder, KeyPattern,
    ManualClock, PersistentStore, TtlClass, WriteMode,
};
pub use error::{CacheError, FieldError, RegistryError, Result, ToolError};
pub use tools::{
    executor_fn, Dispatcher, FailureKind, ParamSpec, ParamValidator, ParameterSchema, Params,
    ToolContext, ToolDescriptor, ToolExecutor, ToolInvocationResult, ToolKind, ToolRegistry,
    ToolSpec,
};
