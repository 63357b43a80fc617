//! Error types for cache and tool dispatch operations
//!
//! Three families live here:
//! - [`CacheError`]: cache-tier, codec and configuration faults. Tier faults
//!   are recovered inside the cache manager and never reach tool callers.
//! - [`ToolError`]: the user-visible invocation taxonomy.
//! - [`RegistryError`]: startup-time registration faults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Parameters could not be canonicalized into a cache key
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Persistent store could not be reached
    #[error("Persistent store unavailable: {0}")]
    StoreUnavailable(String),

    /// Persistent store rejected or failed an operation
    #[error("Persistent store error: {0}")]
    StoreError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether this fault belongs to a cache tier (recoverable as a miss)
    pub fn is_tier_error(&self) -> bool {
        matches!(
            self,
            CacheError::StoreUnavailable(_) | CacheError::StoreError(_)
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Parameter name (empty for errors about the whole object)
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Errors surfaced by tool invocation
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    /// The requested tool is not registered
    #[error("Unknown tool: {name}. Available tools: {}", .available.join(", "))]
    UnknownTool {
        name: String,
        available: Vec<String>,
    },

    /// Parameters failed schema validation
    #[error("Parameter validation failed: {}", join_field_errors(.details))]
    InvalidParameters { details: Vec<FieldError> },

    /// The executor failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The executor did not finish before the invocation deadline
    #[error("Execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl ToolError {
    /// Shorthand for executor failures
    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::Execution(message.into())
    }
}

impl From<CacheError> for ToolError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::InvalidParameters(message) => ToolError::InvalidParameters {
                details: vec![FieldError::new("", message)],
            },
            other => ToolError::Execution(other.to_string()),
        }
    }
}

fn join_field_errors(details: &[FieldError]) -> String {
    details
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Startup-time registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// A descriptor failed its own consistency checks
    #[error("Invalid tool descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },
}
