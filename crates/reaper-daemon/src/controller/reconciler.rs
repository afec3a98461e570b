//! Per-resource TTL reconciliation
//!
//! The reconciler is invoked with a single key and decides whether the
//! resource should be left alone, deleted, or looked at again later. It keeps
//! no state between invocations; per-key serialization is provided by the
//! work queue that calls it.

use super::expiry;
use crate::clock::Clock;
use crate::error::{ReconcileError, StorageError};
use crate::storage::{ResourceStore, StorageResult};
use reaper_types::{
    parse_ttl, ExpirableResource, ReaperEvent, ReaperEventEnvelope, ResourceKey, TTL_ANNOTATION,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

const FETCH: &str = "getting resource from store";
const DELETE: &str = "deleting resource";

/// Successful reconciliation outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do for this trigger
    NoOp,
    /// Look at this key again no earlier than the given delay
    RequeueAfter(Duration),
    /// The resource was expired and is gone
    Deleted,
}

/// Result of a single reconciliation
pub type ReconcileResult = Result<Outcome, ReconcileError>;

/// TTL reconciler
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<ReaperEventEnvelope>,
    ttl_annotation: String,
    store_timeout: Duration,
}

impl Reconciler {
    /// Create a reconciler using the well-known TTL annotation
    pub fn new(
        store: Arc<dyn ResourceStore>,
        clock: Arc<dyn Clock>,
        event_tx: broadcast::Sender<ReaperEventEnvelope>,
    ) -> Self {
        Self {
            store,
            clock,
            event_tx,
            ttl_annotation: TTL_ANNOTATION.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Read the TTL from a different annotation key
    pub fn with_ttl_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.ttl_annotation = annotation.into();
        self
    }

    /// Bound every store call by `timeout`
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn ttl_annotation(&self) -> &str {
        &self.ttl_annotation
    }

    /// Reconcile the resource identified by `key`
    ///
    /// Store calls are abandoned when `cancel` fires or the store timeout
    /// elapses; both surface as transient errors.
    pub async fn reconcile(&self, key: &ResourceKey, cancel: &CancellationToken) -> ReconcileResult {
        let resource = match self.guarded(FETCH, cancel, self.store.get_resource(key)).await? {
            Ok(Some(resource)) => resource,
            Ok(None) | Err(StorageError::NotFound(_)) => {
                tracing::debug!(
                    namespace = %key.namespace,
                    name = %key.name,
                    "Ignoring cached resource that must have been deleted"
                );
                return Ok(Outcome::NoOp);
            }
            Err(e) => return Err(ReconcileError::Fetch(e)),
        };

        let Some(raw_ttl) = resource.annotation(&self.ttl_annotation) else {
            tracing::debug!(
                namespace = %key.namespace,
                name = %key.name,
                "Ignoring resource without TTL set"
            );
            return Ok(Outcome::NoOp);
        };

        let ttl = match parse_ttl(raw_ttl) {
            Ok(ttl) => ttl,
            Err(source) => {
                let err = ReconcileError::InvalidTtl {
                    annotation: self.ttl_annotation.clone(),
                    value: raw_ttl.to_string(),
                    source,
                };
                self.emit_event(ReaperEvent::InvalidTtlAnnotation {
                    key: key.clone(),
                    value: raw_ttl.to_string(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        let expiry = expiry::evaluate(ttl, resource.update_timestamp, self.clock.now());
        if !expiry.expired {
            tracing::debug!(
                namespace = %key.namespace,
                name = %key.name,
                remaining = ?expiry.remaining,
                "RequeueAfter"
            );
            return Ok(Outcome::RequeueAfter(expiry.remaining));
        }

        tracing::info!(
            namespace = %key.namespace,
            name = %key.name,
            ttl = %raw_ttl,
            "Removing resource with expired TTL"
        );

        let removed = match self.guarded(DELETE, cancel, self.store.delete_resource(key)).await? {
            Ok(existed) => existed,
            Err(StorageError::NotFound(_)) => false,
            Err(e) => return Err(ReconcileError::Delete(e)),
        };

        // ResourceExpired only reports deletions made here.
        if removed {
            self.emit_expired(&resource, raw_ttl);
        } else {
            tracing::debug!(
                namespace = %key.namespace,
                name = %key.name,
                "Resource already removed"
            );
        }
        Ok(Outcome::Deleted)
    }

    /// Run a store call under the cancellation token and the store timeout
    async fn guarded<T>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: impl Future<Output = StorageResult<T>>,
    ) -> Result<StorageResult<T>, ReconcileError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReconcileError::Cancelled { operation }),
            result = tokio::time::timeout(self.store_timeout, call) => {
                result.map_err(|_| ReconcileError::DeadlineExceeded {
                    operation,
                    timeout: self.store_timeout,
                })
            }
        }
    }

    fn emit_expired(&self, resource: &ExpirableResource, raw_ttl: &str) {
        self.emit_event(ReaperEvent::ResourceExpired {
            key: resource.key.clone(),
            ttl: raw_ttl.to_string(),
            update_timestamp: resource.update_timestamp,
        });
    }

    fn emit_event(&self, event: ReaperEvent) {
        let envelope = ReaperEventEnvelope::new(event).with_actor("reconciler");
        let _ = self.event_tx.send(envelope);
    }
}
