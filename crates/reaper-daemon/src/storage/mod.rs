//! Storage layer for reaper-daemon
//!
//! Provides the resource store the reconciler reads from and deletes from,
//! the watch stream feeding the controller, and the event log.

mod memory;
mod traits;

pub use memory::InMemoryStorage;
pub use traits::{EventStorage, ResourceStore, ResourceWatch, Storage, StorageResult, WatchEvent};
