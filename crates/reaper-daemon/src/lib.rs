//! TTL reaper daemon library
//!
//! This module provides the core components for the reaper daemon:
//! - Expiry calculation and the per-resource reconciler
//! - Work queue, predicates and controller loop
//! - Storage backends and watch stream
//! - REST API and server lifecycle management

#![deny(unsafe_code)]

pub mod api;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod server;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DaemonConfig;
pub use controller::{Controller, Outcome, ReconcileResult, Reconciler};
pub use error::{ApiError, DaemonError, ErrorClass, ReconcileError, StorageError};
pub use server::Server;
pub use storage::{InMemoryStorage, ResourceStore, Storage};
