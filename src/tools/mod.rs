//! Tool registry and dispatch
//!
//! Tools are registered once at startup with a [`ToolKind`] that decides how
//! the [`Dispatcher`] runs them: cacheable reads go through the shared
//! [`CacheManager`](crate::cache::CacheManager), direct reads and mutations
//! always execute, and mutations invalidate their rendered scopes afterwards.

pub mod dispatcher;
pub mod registry;
pub mod schema;

pub use dispatcher::{Dispatcher, FailureKind, ToolInvocationResult};
pub use registry::{
    executor_fn, FnExecutor, ToolContext, ToolDescriptor, ToolExecutor, ToolKind, ToolRegistry, ToolSpec,
};
pub use schema::{ParamSpec, ParamType, ParamValidator, ParameterSchema, Params};
