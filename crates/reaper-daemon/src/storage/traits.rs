//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use reaper_types::{ExpirableResource, ReaperEventEnvelope, ResourceKey};
use tokio::sync::broadcast;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Combined storage trait
pub trait Storage: ResourceStore + ResourceWatch + EventStorage + Send + Sync {}

impl<T> Storage for T where T: ResourceStore + ResourceWatch + EventStorage + Send + Sync {}

/// Authoritative store of expirable resources
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a resource by key; `None` when it does not exist
    async fn get_resource(&self, key: &ResourceKey) -> StorageResult<Option<ExpirableResource>>;

    /// List all resources
    async fn list_resources(&self) -> StorageResult<Vec<ExpirableResource>>;

    /// Create or update a resource
    async fn upsert_resource(&self, resource: ExpirableResource) -> StorageResult<()>;

    /// Delete a resource by key; returns whether it existed
    async fn delete_resource(&self, key: &ResourceKey) -> StorageResult<bool>;
}

/// Change notification emitted by a watchable store
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Resource created or updated
    Applied(ExpirableResource),
    /// Resource removed
    Deleted(ResourceKey),
}

/// Source of change notifications
pub trait ResourceWatch: Send + Sync {
    /// Subscribe to changes made after this call
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Storage for events
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Store an event
    async fn store_event(&self, event: ReaperEventEnvelope) -> StorageResult<()>;

    /// Get recent events, newest last
    async fn get_recent_events(&self, limit: usize) -> StorageResult<Vec<ReaperEventEnvelope>>;
}
