//! Reaper Types - Core types for TTL-driven garbage collection
//!
//! Resources managed by the control plane may carry a TTL annotation. The
//! reaper re-evaluates annotated resources and deletes them once
//! `update_timestamp + ttl` has passed.
//!
//! ## Key Concepts
//!
//! - **ResourceKey**: namespace + name identity handed around by the work queue
//! - **ExpirableResource**: annotations plus the reference timestamp of the last content computation
//! - **TTL grammar**: `(unsigned integer)(unit)` pairs such as `1h30m` or `250ms`
//! - **Events**: observable record of deletions and configuration problems

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod duration;
pub mod events;
pub mod ids;
pub mod resource;

// Re-export main types
pub use duration::{parse_ttl, DurationParseError};
pub use events::{EventSeverity, ReaperEvent, ReaperEventEnvelope};
pub use ids::{ParseKeyError, ResourceKey};
pub use resource::{ExpirableResource, TTL_ANNOTATION};
