//! Tool descriptors and the registry that owns them

use crate::cache::{manager::CacheManager, ttl::TtlClass};
use crate::error::{RegistryError, ToolError};
use crate::tools::schema::{ParamValidator, ParameterSchema, Params};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Execution category of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolKind {
    /// Read whose result is cached under its TTL class
    CacheableRead { ttl: TtlClass },
    /// Read that always hits the data source
    DirectRead,
    /// Write; never cached
    Mutation,
}

impl ToolKind {
    pub fn cacheable(&self) -> bool {
        matches!(self, ToolKind::CacheableRead { .. })
    }

    pub fn ttl_class(&self) -> Option<TtlClass> {
        match self {
            ToolKind::CacheableRead { ttl } => Some(*ttl),
            _ => None,
        }
    }
}

/// Per-invocation context handed to executors
#[derive(Clone)]
pub struct ToolContext {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    /// Shared cache for executors that cache their own data-access calls
    pub cache: Arc<CacheManager>,
    /// Upper bound on executor run time
    pub deadline: Option<Duration>,
}

impl ToolContext {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            conversation_id: None,
            cache,
            deadline: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The code behind a tool
///
/// Executors own whatever data-access handle they need; the context only
/// carries caller identity and the shared cache.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, ctx: &ToolContext, params: &Params) -> Result<Value, ToolError>;
}

/// Adapter turning an async closure into a [`ToolExecutor`]
pub struct FnExecutor<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(ToolContext, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn execute(&self, ctx: &ToolContext, params: &Params) -> Result<Value, ToolError> {
        (self.f)(ctx.clone(), params.clone()).await
    }
}

/// Wrap an async closure as a shared executor
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn ToolExecutor>
where
    F: Fn(ToolContext, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(FnExecutor { f })
}

/// Everything the dispatcher needs to know about one tool
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
    pub schema: ParameterSchema,
    /// Entity scopes such as `project:{projectId}`, rendered from validated parameters
    pub scopes: Vec<String>,
    pub executor: Arc<dyn ToolExecutor>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ToolKind,
        schema: ParameterSchema,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            schema,
            scopes: Vec::new(),
            executor,
        }
    }

    pub fn cacheable_read(
        name: impl Into<String>,
        description: impl Into<String>,
        ttl: TtlClass,
        schema: ParameterSchema,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self::new(name, description, ToolKind::CacheableRead { ttl }, schema, executor)
    }

    pub fn direct_read(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self::new(name, description, ToolKind::DirectRead, schema, executor)
    }

    pub fn mutation(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self::new(name, description, ToolKind::Mutation, schema, executor)
    }

    /// Attach an entity scope; `{param}` placeholders name schema parameters
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn cacheable(&self) -> bool {
        self.kind.cacheable()
    }

    pub fn ttl_class(&self) -> Option<TtlClass> {
        self.kind.ttl_class()
    }

    /// Scopes rendered with `params`; scopes with a missing placeholder are skipped
    pub fn render_scopes(&self, params: &Params) -> Vec<String> {
        self.scopes
            .iter()
            .filter_map(|scope| render_scope(scope, params))
            .collect()
    }

    /// Tags stored with cached results: `"<scope>:<tool>"`
    pub fn render_tags(&self, params: &Params) -> Vec<String> {
        self.render_scopes(params)
            .into_iter()
            .map(|scope| format!("{}:{}", scope, self.name))
            .collect()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() || self.name.contains(':') {
            return Err(invalid("name must be non-empty and must not contain ':'".to_string()));
        }

        if self.kind == (ToolKind::CacheableRead { ttl: TtlClass::None }) {
            return Err(invalid("cacheable reads need a TTL class other than none".to_string()));
        }

        for scope in &self.scopes {
            for placeholder in placeholders(scope) {
                if self.schema.get(placeholder).is_none() {
                    return Err(invalid(format!(
                        "scope '{}' references unknown parameter '{}'",
                        scope, placeholder
                    )));
                }
            }
        }

        Ok(())
    }
}

fn placeholders(scope: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = scope;
    while let Some(start) = rest.find('{') {
        match rest[start + 1..].find('}') {
            Some(len) => {
                found.push(&rest[start + 1..start + 1 + len]);
                rest = &rest[start + 1 + len + 1..];
            }
            None => break,
        }
    }
    found
}

/// `None` when a placeholder is missing or its value would act as a wildcard
fn render_scope(scope: &str, params: &Params) -> Option<String> {
    let mut rendered = scope.to_string();
    for placeholder in placeholders(scope) {
        let value = match params.get(placeholder)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        if value.is_empty() || value.contains('*') {
            return None;
        }
        rendered = rendered.replace(&format!("{{{}}}", placeholder), &value);
    }
    Some(rendered)
}

/// Public shape of a registered tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Name → descriptor map, fixed after startup
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolDescriptor>>,
    validators: HashMap<String, ParamValidator>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names are unique and the parameter schema is compiled here
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        descriptor.validate()?;

        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }

        let validator = descriptor
            .schema
            .compile()
            .map_err(|reason| RegistryError::InvalidDescriptor {
                name: descriptor.name.clone(),
                reason: format!("parameter schema does not compile: {}", reason),
            })?;

        debug!("Registered tool {} ({:?})", descriptor.name, descriptor.kind);
        self.order.push(descriptor.name.clone());
        self.validators.insert(descriptor.name.clone(), validator);
        self.tools.insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.get(name).cloned()
    }

    /// Validate raw model-supplied parameters against the compiled schema of `name`
    pub fn validate_params(&self, name: &str, raw: &Value) -> Result<Params, ToolError> {
        let validator = self.validators.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
            available: self.names(),
        })?;

        validator
            .validate(raw)
            .map_err(|details| ToolError::InvalidParameters { details })
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Tool specs in registration order
    pub fn list(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.schema.to_json_schema(),
            })
            .collect()
    }

    /// Function-calling definitions: `{type: "function", function: {name, description, parameters}}`
    pub fn to_llm_functions(&self) -> Vec<Value> {
        self.list()
            .into_iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": spec,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
