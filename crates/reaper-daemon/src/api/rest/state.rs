//! Application state for API handlers

use crate::controller::WorkQueue;
use crate::storage::Storage;
use reaper_types::ReaperEventEnvelope;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Storage backend
    pub storage: Arc<dyn Storage>,

    /// Controller work queue, for status reporting
    pub queue: Arc<WorkQueue>,

    /// Event broadcast channel
    pub event_tx: broadcast::Sender<ReaperEventEnvelope>,

    /// Annotation the reconciler reads the TTL from
    pub ttl_annotation: String,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        storage: Arc<dyn Storage>,
        queue: Arc<WorkQueue>,
        event_tx: broadcast::Sender<ReaperEventEnvelope>,
        ttl_annotation: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            queue,
            event_tx,
            ttl_annotation: ttl_annotation.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
