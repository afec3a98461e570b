//! Event types for reaper observability
//!
//! Events record deletions and problems operators have to act on.

use crate::ResourceKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all reaper events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Actor who emitted the event
    pub actor: Option<String>,

    /// The actual event
    pub event: ReaperEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Reaper events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaperEvent {
    /// A resource outlived its TTL and was deleted
    ResourceExpired {
        key: ResourceKey,
        ttl: String,
        update_timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The TTL annotation cannot be parsed; the resource is left alone
    InvalidTtlAnnotation {
        key: ResourceKey,
        value: String,
        reason: String,
    },

    /// A reconciliation failed with a retryable error
    ReconcileFailed { key: ResourceKey, reason: String },
}

impl ReaperEvent {
    pub fn key(&self) -> &ResourceKey {
        match self {
            ReaperEvent::ResourceExpired { key, .. }
            | ReaperEvent::InvalidTtlAnnotation { key, .. }
            | ReaperEvent::ReconcileFailed { key, .. } => key,
        }
    }
}

impl ReaperEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: ReaperEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: Self::infer_severity(&event),
            actor: None,
            event,
        }
    }

    /// Create with actor
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    fn infer_severity(event: &ReaperEvent) -> EventSeverity {
        match event {
            ReaperEvent::ResourceExpired { .. } => EventSeverity::Info,
            ReaperEvent::ReconcileFailed { .. } => EventSeverity::Warning,
            ReaperEvent::InvalidTtlAnnotation { .. } => EventSeverity::Error,
        }
    }
}
