//! Tool invocation: validate, then read through the cache or execute directly

use crate::cache::manager::{CacheManager, CacheRequest};
use crate::error::{FieldError, ToolError};
use crate::tools::registry::{ToolContext, ToolDescriptor, ToolKind, ToolRegistry};
use crate::tools::schema::Params;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Category of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    InvalidParameters,
    ExecutionError,
}

/// Outcome returned to the conversational layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolInvocationResult {
    Success {
        data: Value,
    },
    Failure {
        kind: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        details: Vec<FieldError>,
    },
}

impl ToolInvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolInvocationResult::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ToolInvocationResult::Success { data } => Some(data),
            ToolInvocationResult::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ToolInvocationResult::Success { .. } => None,
            ToolInvocationResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<ToolError> for ToolInvocationResult {
    fn from(error: ToolError) -> Self {
        let message = error.to_string();
        match error {
            ToolError::UnknownTool { .. } => ToolInvocationResult::Failure {
                kind: FailureKind::UnknownTool,
                message,
                details: Vec::new(),
            },
            ToolError::InvalidParameters { details } => ToolInvocationResult::Failure {
                kind: FailureKind::InvalidParameters,
                message,
                details,
            },
            ToolError::Execution(_) | ToolError::Timeout(_) => ToolInvocationResult::Failure {
                kind: FailureKind::ExecutionError,
                message,
                details: Vec::new(),
            },
        }
    }
}

impl From<Result<Value, ToolError>> for ToolInvocationResult {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(data) => ToolInvocationResult::Success { data },
            Err(e) => e.into(),
        }
    }
}

/// Entry point for LLM tool calls
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    cache: Arc<CacheManager>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, cache: Arc<CacheManager>) -> Self {
        Self { registry, cache }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Fresh context bound to this dispatcher's cache
    pub fn context(&self) -> ToolContext {
        ToolContext::new(self.cache.clone())
    }

    /// Invoke `tool_name` with the raw parameters sent by the model
    pub async fn invoke(&self, ctx: &ToolContext, tool_name: &str, raw_params: Value) -> ToolInvocationResult {
        let span = info_span!("tool_invoke", tool = tool_name, request_id = %ctx.request_id);

        async {
            let started = Instant::now();
            let result = self.try_invoke(ctx, tool_name, raw_params).await;

            match &result {
                Ok(_) => info!("Tool {} completed in {}ms", tool_name, started.elapsed().as_millis()),
                Err(e) => warn!("Tool {} failed: {}", tool_name, e),
            }

            ToolInvocationResult::from(result)
        }
        .instrument(span)
        .await
    }

    /// Run several tool calls from one model turn concurrently, results in call order
    pub async fn invoke_all(&self, ctx: &ToolContext, calls: Vec<(String, Value)>) -> Vec<ToolInvocationResult> {
        join_all(
            calls
                .into_iter()
                .map(|(tool_name, raw_params)| async move { self.invoke(ctx, &tool_name, raw_params).await }),
        )
        .await
    }

    /// [`invoke`](Self::invoke) returning the typed error
    pub async fn try_invoke(&self, ctx: &ToolContext, tool_name: &str, raw_params: Value) -> Result<Value, ToolError> {
        let descriptor = self
            .registry
            .lookup(tool_name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: tool_name.to_string(),
                available: self.registry.names(),
            })?;

        let params = self.registry.validate_params(&descriptor.name, &raw_params)?;

        match descriptor.kind {
            ToolKind::CacheableRead { ttl } => {
                let ttl = self.cache.ttl_for(ttl).unwrap_or_default();
                let request = CacheRequest::for_tool(&descriptor.name, &params, ttl)?
                    .with_tags(descriptor.render_tags(&params));

                self.cache
                    .get_or_set_request(request, || execute(&descriptor, ctx, &params))
                    .await
            }
            ToolKind::DirectRead => {
                debug!("Executing {} without cache", descriptor.name);
                execute(&descriptor, ctx, &params).await
            }
            ToolKind::Mutation => {
                let data = execute(&descriptor, ctx, &params).await?;
                self.invalidate_scopes(&descriptor, &params).await;
                Ok(data)
            }
        }
    }

    async fn invalidate_scopes(&self, descriptor: &ToolDescriptor, params: &Params) {
        for scope in descriptor.render_scopes(params) {
            let pattern = format!("{}:*", scope);
            let event = self.cache.invalidate_pattern(pattern.as_str()).await;
            debug!(
                "{} invalidated {} entries matching {}",
                descriptor.name,
                event.total_removed(),
                pattern
            );
        }
    }
}

async fn execute(descriptor: &ToolDescriptor, ctx: &ToolContext, params: &Params) -> Result<Value, ToolError> {
    let run = descriptor.executor.execute(ctx, params);

    match ctx.deadline {
        Some(deadline) => tokio::time::timeout(deadline, run)
            .await
            .map_err(|_| ToolError::Timeout(deadline))?,
        None => run.await,
    }
}
