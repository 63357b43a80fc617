//! Cache invalidation triggered by domain writes
//!
//! Reads are cached under keys or tags such as `project:<id>:*` and
//! `projects:list:*`. Every write path names the [`DomainMutation`] it
//! performed and the [`CacheInvalidator`] removes the matching classes of
//! entries from both tiers.

use crate::cache::{manager::CacheManager, pattern::KeyPattern};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entries expired based on TTL
    Expired,

    /// Explicit pattern invalidation
    Pattern { pattern: String },

    /// Every entry owned by a tool
    Tool { tool_name: String },

    /// A domain write made the entries stale
    Mutation { mutation: String },

    /// Full clear
    Cleared,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::Pattern { pattern } => write!(f, "pattern: {}", pattern),
            InvalidationReason::Tool { tool_name } => write!(f, "tool: {}", tool_name),
            InvalidationReason::Mutation { mutation } => write!(f, "mutation: {}", mutation),
            InvalidationReason::Cleared => write!(f, "cache cleared"),
        }
    }
}

/// Outcome of one invalidation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Entries removed from the memory tier
    pub memory_removed: usize,

    /// Rows removed from the persistent tier (0 when it failed or is absent)
    pub persistent_removed: usize,

    /// Additional context
    pub context: Option<String>,
}

impl InvalidationEvent {
    /// Create a new invalidation event
    pub fn new(reason: InvalidationReason, memory_removed: usize, persistent_removed: usize) -> Self {
        Self {
            reason,
            timestamp: Utc::now(),
            memory_removed,
            persistent_removed,
            context: None,
        }
    }

    /// Add context to the event
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }

    pub fn total_removed(&self) -> usize {
        self.memory_removed + self.persistent_removed
    }
}

/// Writes that make cached reads stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainMutation {
    ProjectCreated,
    ProjectUpdated { project_id: String },
    ProjectDeleted { project_id: String },
    StaffUpdated {
        staff_id: String,
        project_id: Option<String>,
    },
    CandidateUpdated { candidate_id: String },
    PaymentCreated { project_id: String },
    ExpenseUpdated { project_id: String },
    UserUpdated { user_id: String },
}

impl DomainMutation {
    pub fn name(&self) -> &'static str {
        match self {
            DomainMutation::ProjectCreated => "project_created",
            DomainMutation::ProjectUpdated { .. } => "project_updated",
            DomainMutation::ProjectDeleted { .. } => "project_deleted",
            DomainMutation::StaffUpdated { .. } => "staff_updated",
            DomainMutation::CandidateUpdated { .. } => "candidate_updated",
            DomainMutation::PaymentCreated { .. } => "payment_created",
            DomainMutation::ExpenseUpdated { .. } => "expense_updated",
            DomainMutation::UserUpdated { .. } => "user_updated",
        }
    }

    /// Key patterns made stale by this write
    pub fn patterns(&self) -> Vec<KeyPattern> {
        let raw: Vec<String> = match self {
            DomainMutation::ProjectCreated => {
                vec!["projects:list:*".into(), "analytics:*".into()]
            }
            DomainMutation::ProjectUpdated { project_id }
            | DomainMutation::ProjectDeleted { project_id } => vec![
                format!("project:{}", project_id),
                format!("project:{}:*", project_id),
                "projects:list:*".into(),
                "analytics:*".into(),
            ],
            DomainMutation::StaffUpdated {
                staff_id,
                project_id,
            } => {
                let mut patterns = vec![
                    format!("staff:{}:*", staff_id),
                    "staff:available:*".into(),
                ];
                if let Some(project_id) = project_id {
                    patterns.push(format!("project:{}:*", project_id));
                }
                patterns
            }
            DomainMutation::CandidateUpdated { candidate_id } => vec![
                format!("candidate:{}:*", candidate_id),
                "candidates:list:*".into(),
            ],
            DomainMutation::PaymentCreated { project_id } => vec![
                format!("project:{}:*", project_id),
                "analytics:payment:*".into(),
            ],
            DomainMutation::ExpenseUpdated { project_id } => vec![
                format!("project:{}:expenses*", project_id),
                "analytics:expense:*".into(),
            ],
            DomainMutation::UserUpdated { user_id } => vec![
                format!("user:{}", user_id),
                format!("user:{}:*", user_id),
            ],
        };

        raw.into_iter().map(KeyPattern::new).collect()
    }
}

impl std::fmt::Display for DomainMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies [`DomainMutation`]s to a shared cache
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<CacheManager>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    /// Invalidate every pattern of `mutation`, returning the combined event
    pub async fn apply(&self, mutation: &DomainMutation) -> InvalidationEvent {
        let mut memory_removed = 0;
        let mut persistent_removed = 0;

        for pattern in mutation.patterns() {
            let event = self.cache.invalidate_pattern(pattern).await;
            memory_removed += event.memory_removed;
            persistent_removed += event.persistent_removed;
        }

        info!(
            "Invalidated {} memory / {} persistent entries after {}",
            memory_removed, persistent_removed, mutation
        );

        InvalidationEvent::new(
            InvalidationReason::Mutation {
                mutation: mutation.name().to_string(),
            },
            memory_removed,
            persistent_removed,
        )
    }

    pub async fn on_project_created(&self) -> InvalidationEvent {
        self.apply(&DomainMutation::ProjectCreated).await
    }

    pub async fn on_project_update(&self, project_id: &str) -> InvalidationEvent {
        self.apply(&DomainMutation::ProjectUpdated {
            project_id: project_id.to_string(),
        })
        .await
    }

    pub async fn on_staff_update(&self, staff_id: &str, project_id: Option<&str>) -> InvalidationEvent {
        self.apply(&DomainMutation::StaffUpdated {
            staff_id: staff_id.to_string(),
            project_id: project_id.map(str::to_string),
        })
        .await
    }

    pub async fn on_payment_created(&self, project_id: &str) -> InvalidationEvent {
        self.apply(&DomainMutation::PaymentCreated {
            project_id: project_id.to_string(),
        })
        .await
    }

    pub async fn on_expense_update(&self, project_id: &str) -> InvalidationEvent {
        self.apply(&DomainMutation::ExpenseUpdated {
            project_id: project_id.to_string(),
        })
        .await
    }

    pub async fn on_user_update(&self, user_id: &str) -> InvalidationEvent {
        self.apply(&DomainMutation::UserUpdated {
            user_id: user_id.to_string(),
        })
        .await
    }
}
