//! TTL controller
//!
//! Watches the store, filters changes through predicates, and drives the
//! [`Reconciler`] from a pool of workers fed by the [`WorkQueue`].

pub mod expiry;
pub mod predicate;
pub mod queue;
pub mod reconciler;

pub use expiry::{evaluate, Expiry};
pub use predicate::{InstallMode, NotBeingTerminated, Predicate};
pub use queue::{Backoff, WorkQueue};
pub use reconciler::{Outcome, ReconcileResult, Reconciler};

use crate::config::ControllerConfig;
use crate::storage::{Storage, WatchEvent};
use rand::Rng;
use reaper_types::{ExpirableResource, ReaperEvent, ReaperEventEnvelope, ResourceKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Smallest delay used for TTL requeues
const MIN_REQUEUE: Duration = Duration::from_millis(1);

/// Controller state
pub struct Controller {
    config: ControllerConfig,
    storage: Arc<dyn Storage>,
    reconciler: Arc<Reconciler>,
    predicates: Vec<Box<dyn Predicate>>,
    queue: Arc<WorkQueue>,
    event_tx: broadcast::Sender<ReaperEventEnvelope>,
}

impl Controller {
    /// Create a new controller
    pub fn new(
        config: ControllerConfig,
        storage: Arc<dyn Storage>,
        reconciler: Arc<Reconciler>,
        predicates: Vec<Box<dyn Predicate>>,
        event_tx: broadcast::Sender<ReaperEventEnvelope>,
    ) -> Arc<Self> {
        let queue = WorkQueue::new(Backoff::new(config.base_backoff(), config.max_backoff()));
        Arc::new(Self {
            config,
            storage,
            reconciler,
            predicates,
            queue,
            event_tx,
        })
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Run the watch loop and workers until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            workers = self.config.workers,
            annotation = %self.reconciler.ttl_annotation(),
            "Controller started"
        );

        let mut tasks = JoinSet::new();

        let watcher = self.clone();
        let watch_shutdown = shutdown.clone();
        tasks.spawn(async move { watcher.watch_loop(watch_shutdown).await });

        for worker in 0..self.config.workers.max(1) {
            let controller = self.clone();
            let worker_shutdown = shutdown.clone();
            tasks.spawn(async move { controller.worker_loop(worker, worker_shutdown).await });
        }

        shutdown.cancelled().await;
        self.queue.shut_down();

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Controller task failed");
            }
        }

        tracing::info!("Controller stopped");
    }

    /// Enqueue everything currently in the store
    pub async fn resync(&self) {
        match self.storage.list_resources().await {
            Ok(resources) => {
                tracing::debug!(count = resources.len(), "Resyncing resources");
                for resource in &resources {
                    self.enqueue_if_admitted(resource);
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to list resources"),
        }
    }

    async fn watch_loop(&self, shutdown: CancellationToken) {
        // Subscribe before listing so no change falls between the two.
        let mut rx = self.storage.watch();
        self.resync().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(WatchEvent::Applied(resource)) => self.enqueue_if_admitted(&resource),
                    Ok(WatchEvent::Deleted(key)) => {
                        tracing::trace!(namespace = %key.namespace, name = %key.name, "Resource deleted");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Watch stream lagged, resyncing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("Watch stream closed");
                        break;
                    }
                },
            }
        }
    }

    async fn worker_loop(&self, worker: usize, shutdown: CancellationToken) {
        tracing::debug!(worker, "Worker started");
        while let Some(key) = self.queue.get().await {
            let result = self.reconciler.reconcile(&key, &shutdown).await;
            self.handle_result(&key, result);
            self.queue.done(&key);
        }
        tracing::debug!(worker, "Worker stopped");
    }

    fn enqueue_if_admitted(&self, resource: &ExpirableResource) {
        if self.predicates.iter().all(|p| p.admit(resource)) {
            self.queue.add(resource.key.clone());
        }
    }

    /// Translate a reconciliation result into queue operations
    pub fn handle_result(&self, key: &ResourceKey, result: ReconcileResult) {
        match result {
            Ok(Outcome::NoOp) | Ok(Outcome::Deleted) => self.queue.forget(key),
            Ok(Outcome::RequeueAfter(remaining)) => {
                self.queue.forget(key);
                // A resource sitting exactly on its expiry instant is not yet
                // expired; look again just after it.
                let delay = self.jittered(remaining.max(MIN_REQUEUE));
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) if e.is_permanent() => {
                tracing::error!(
                    namespace = %key.namespace,
                    name = %key.name,
                    error = %e,
                    "Reconciliation failed permanently; fix the resource to retry sooner"
                );
                self.queue.forget(key);
                self.queue.add_after(key.clone(), self.config.max_backoff());
            }
            Err(e) => {
                let retry_in = self.queue.add_rate_limited(key.clone());
                tracing::warn!(
                    namespace = %key.namespace,
                    name = %key.name,
                    error = %e,
                    retry_in = ?retry_in,
                    attempt = self.queue.num_requeues(key),
                    "Reconciliation failed"
                );
                self.emit_event(ReaperEvent::ReconcileFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let fraction = self.config.requeue_jitter;
        if fraction <= 0.0 {
            return delay;
        }
        let max_extra = delay.mul_f64(fraction.min(1.0));
        delay + rand::thread_rng().gen_range(Duration::ZERO..=max_extra)
    }

    fn emit_event(&self, event: ReaperEvent) {
        let envelope = ReaperEventEnvelope::new(event).with_actor("controller");
        let _ = self.event_tx.send(envelope);
    }
}
