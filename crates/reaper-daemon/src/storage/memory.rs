//! In-memory storage implementation

use super::traits::*;
use async_trait::async_trait;
use reaper_types::{ExpirableResource, ReaperEventEnvelope, ResourceKey};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const DEFAULT_EVENT_CAPACITY: usize = 1000;
const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// In-memory storage for development and testing
#[derive(Debug)]
pub struct InMemoryStorage {
    resources: Arc<RwLock<HashMap<ResourceKey, ExpirableResource>>>,
    events: Arc<RwLock<VecDeque<ReaperEventEnvelope>>>,
    event_capacity: usize,
    watch_tx: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a storage retaining at most `event_capacity` events
    pub fn with_event_capacity(event_capacity: usize) -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            resources: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(VecDeque::new())),
            event_capacity: event_capacity.max(1),
            watch_tx,
        }
    }

    fn publish(&self, event: WatchEvent) {
        // No subscribers is fine: nobody is watching yet.
        let _ = self.watch_tx.send(event);
    }
}

#[async_trait]
impl ResourceStore for InMemoryStorage {
    async fn get_resource(&self, key: &ResourceKey) -> StorageResult<Option<ExpirableResource>> {
        let resources = self.resources.read().await;
        Ok(resources.get(key).cloned())
    }

    async fn list_resources(&self) -> StorageResult<Vec<ExpirableResource>> {
        let resources = self.resources.read().await;
        let mut list: Vec<_> = resources.values().cloned().collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(list)
    }

    async fn upsert_resource(&self, resource: ExpirableResource) -> StorageResult<()> {
        let mut resources = self.resources.write().await;
        resources.insert(resource.key.clone(), resource.clone());
        drop(resources);

        self.publish(WatchEvent::Applied(resource));
        Ok(())
    }

    async fn delete_resource(&self, key: &ResourceKey) -> StorageResult<bool> {
        let mut resources = self.resources.write().await;
        let existed = resources.remove(key).is_some();
        drop(resources);

        if existed {
            self.publish(WatchEvent::Deleted(key.clone()));
        }
        Ok(existed)
    }
}

impl ResourceWatch for InMemoryStorage {
    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.watch_tx.subscribe()
    }
}

#[async_trait]
impl EventStorage for InMemoryStorage {
    async fn store_event(&self, event: ReaperEventEnvelope) -> StorageResult<()> {
        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > self.event_capacity {
            events.pop_front();
        }
        Ok(())
    }

    async fn get_recent_events(&self, limit: usize) -> StorageResult<Vec<ReaperEventEnvelope>> {
        let events = self.events.read().await;
        let skip = events.len().saturating_sub(limit);
        Ok(events.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reaper_types::ReaperEvent;

    fn create_test_resource(name: &str) -> ExpirableResource {
        ExpirableResource::new(ResourceKey::new("default", name), chrono::Utc::now()).with_ttl("1h")
    }

    #[tokio::test]
    async fn test_resource_crud() {
        let storage = InMemoryStorage::new();
        let resource = create_test_resource("report-a");

        // Create
        storage.upsert_resource(resource.clone()).await.unwrap();

        // Read
        let retrieved = storage.get_resource(&resource.key).await.unwrap();
        assert_eq!(retrieved, Some(resource.clone()));

        // List
        let resources = storage.list_resources().await.unwrap();
        assert_eq!(resources.len(), 1);

        // Delete
        assert!(storage.delete_resource(&resource.key).await.unwrap());
        assert!(storage.get_resource(&resource.key).await.unwrap().is_none());

        // Deleting again reports absence, not an error
        assert!(!storage.delete_resource(&resource.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_publishes_changes() {
        let storage = InMemoryStorage::new();
        let mut rx = storage.watch();
        let resource = create_test_resource("report-b");

        storage.upsert_resource(resource.clone()).await.unwrap();
        storage.delete_resource(&resource.key).await.unwrap();
        // A no-op delete is not published
        storage.delete_resource(&resource.key).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), WatchEvent::Applied(resource.clone()));
        assert_eq!(rx.recv().await.unwrap(), WatchEvent::Deleted(resource.key));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_log_is_bounded() {
        let storage = InMemoryStorage::with_event_capacity(2);
        for name in ["a", "b", "c"] {
            let event = ReaperEventEnvelope::new(ReaperEvent::ReconcileFailed {
                key: ResourceKey::new("default", name),
                reason: "test".to_string(),
            });
            storage.store_event(event).await.unwrap();
        }

        let events = storage.get_recent_events(10).await.unwrap();
        let names: Vec<_> = events.iter().map(|e| e.event.key().name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        let latest = storage.get_recent_events(1).await.unwrap();
        assert_eq!(latest[0].event.key().name, "c");
    }
}
