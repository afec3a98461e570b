//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::clock::SystemClock;
use crate::config::DaemonConfig;
use crate::controller::{Controller, InstallMode, NotBeingTerminated, Predicate, Reconciler};
use crate::error::{DaemonError, DaemonResult};
use crate::storage::{InMemoryStorage, Storage};
use reaper_types::ReaperEventEnvelope;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// TTL reaper daemon
pub struct Server {
    config: DaemonConfig,
    storage: Arc<InMemoryStorage>,
    controller: Arc<Controller>,
    event_tx: broadcast::Sender<ReaperEventEnvelope>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        Self::with_storage(config, Arc::new(InMemoryStorage::new()))
    }

    /// Create a server over an existing store
    pub fn with_storage(config: DaemonConfig, storage: Arc<InMemoryStorage>) -> DaemonResult<Self> {
        config.validate()?;

        let install_mode = InstallMode::from_config(&config.namespaces)?;
        tracing::info!(?install_mode, "Resolved install mode");

        let (event_tx, _) = broadcast::channel(config.controller.event_buffer);

        let reconciler = Reconciler::new(storage.clone(), Arc::new(SystemClock), event_tx.clone())
            .with_ttl_annotation(config.controller.ttl_annotation.clone())
            .with_store_timeout(config.controller.store_timeout());

        let predicates: Vec<Box<dyn Predicate>> =
            vec![Box::new(NotBeingTerminated), Box::new(install_mode)];

        let controller = Controller::new(
            config.controller.clone(),
            storage.clone(),
            Arc::new(reconciler),
            predicates,
            event_tx.clone(),
        );

        Ok(Self {
            config,
            storage,
            controller,
            event_tx,
        })
    }

    /// Run the API and controller until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let shutdown = CancellationToken::new();

        let state = AppState::new(
            self.storage.clone(),
            self.controller.queue().clone(),
            self.event_tx.clone(),
            self.config.controller.ttl_annotation.clone(),
        );
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("TTL reaper listening on {}", addr);

        let recorder = tokio::spawn(record_events(
            self.storage.clone(),
            self.event_tx.subscribe(),
            shutdown.clone(),
        ));
        let controller = tokio::spawn(self.controller.clone().run(shutdown.clone()));

        let serve_shutdown = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                serve_shutdown.cancel();
            })
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("TTL reaper shutting down");

        // Cancels in-flight store calls and stops the workers
        shutdown.cancel();
        if let Err(e) = controller.await {
            tracing::error!(error = %e, "Controller task panicked");
        }
        if let Err(e) = recorder.await {
            tracing::error!(error = %e, "Event recorder panicked");
        }

        served
    }
}

/// Persist broadcast events into the event log
async fn record_events(
    storage: Arc<dyn Storage>,
    mut rx: broadcast::Receiver<ReaperEventEnvelope>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => {
                    if let Err(e) = storage.store_event(event).await {
                        tracing::warn!(error = %e, "Failed to record event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event recorder lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
