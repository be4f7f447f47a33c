//! Worker engine: ties the lifecycle, precache, janitor, interceptor, and
//! client registry together for one scope.
//!
//! Event ordering follows the platform contract:
//!
//! - `install(config)` precaches into the new version's bucket. Failure
//!   discards that version; whatever was active keeps serving.
//! - The installed version waits. It activates when the last controlled
//!   client goes away, or immediately on a `SKIP_WAITING` message.
//! - `activate()` sweeps stale buckets to completion before claiming
//!   clients, so no fetch ever races a half-deleted bucket set.

use std::sync::Arc;

use nexuskit_net::Fetcher;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::ClientRegistry;
use crate::config::WorkerConfig;
use crate::janitor;
use crate::lifecycle::Registration;
use crate::message::ClientMessage;
use crate::precache::{PrecacheLoader, PrecacheReport};
use crate::strategy::{FetchEvent, FetchInterceptor, FetchResult, ResponseSource};
use crate::SwError;

/// Notifications the embedding page layer subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A new version finished precaching and is waiting to activate.
    /// Typically surfaced as a "refresh for the new version" banner.
    UpdateReady { version: String },
    /// Precache failed; the version was discarded.
    InstallFailed { version: String, reason: String },
    /// A version completed activation and now controls the scope.
    Activated { version: String },
    /// A client's controlling version changed (post-claim reload cue).
    ControllerChange { client_id: String, version: String },
}

/// The engine for one worker scope.
///
/// All mutable state sits behind its own lock; no lock is held across an
/// await of another, so concurrent fetches and a background install never
/// deadlock.
pub struct ServiceWorkerEngine {
    storage: Arc<RwLock<CacheStorage>>,
    fetcher: Arc<dyn Fetcher>,
    registration: RwLock<Registration>,
    clients: RwLock<ClientRegistry>,
    active_config: RwLock<Option<Arc<WorkerConfig>>>,
    waiting_config: RwLock<Option<Arc<WorkerConfig>>>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ServiceWorkerEngine {
    /// Create an engine plus the receiver for its lifecycle events.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = Self {
            storage: Arc::new(RwLock::new(CacheStorage::new())),
            fetcher,
            registration: RwLock::new(Registration::new()),
            clients: RwLock::new(ClientRegistry::new()),
            active_config: RwLock::new(None),
            waiting_config: RwLock::new(None),
            event_tx,
        };
        (engine, event_rx)
    }

    /// Install a worker version: validate, precache, and park it in the
    /// waiting slot. On failure the version is discarded and the error
    /// returned; the previously active version is untouched.
    pub async fn install(&self, config: WorkerConfig) -> Result<PrecacheReport, SwError> {
        config.validate()?;
        let config = Arc::new(config);
        info!(version = %config.version, "installing worker version");

        self.registration.write().await.begin_install(&config.version)?;

        let loader = PrecacheLoader::new(Arc::clone(&self.fetcher));
        match loader.run(&config, &self.storage).await {
            Ok(report) => {
                self.registration.write().await.install_complete()?;
                *self.waiting_config.write().await = Some(Arc::clone(&config));
                self.emit(WorkerEvent::UpdateReady {
                    version: config.version.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(version = %config.version, error = %e, "install failed");
                self.registration.write().await.install_failed();
                self.emit(WorkerEvent::InstallFailed {
                    version: config.version.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Activate the waiting version: sweep stale buckets, promote it, and
    /// claim every client. Fails with [`SwError::NoWaitingWorker`] when
    /// nothing is waiting.
    pub async fn activate(&self) -> Result<(), SwError> {
        let config = self
            .waiting_config
            .read()
            .await
            .clone()
            .ok_or(SwError::NoWaitingWorker)?;
        info!(version = %config.version, "activating worker version");

        self.registration.write().await.begin_activation()?;

        // Sweep runs to completion before any client is claimed.
        let report = janitor::sweep(&config, &self.storage).await;
        debug!(deleted = report.deleted.len(), "stale buckets removed");

        self.registration.write().await.activation_complete()?;
        *self.active_config.write().await = Some(Arc::clone(&config));
        *self.waiting_config.write().await = None;

        let changed = self.clients.write().await.claim(&config.version);
        self.emit(WorkerEvent::Activated {
            version: config.version.clone(),
        });
        for client_id in changed {
            self.emit(WorkerEvent::ControllerChange {
                client_id,
                version: config.version.clone(),
            });
        }
        Ok(())
    }

    /// Handle one fetch. With no active version the request goes straight
    /// to the network, exactly as if no worker were registered.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> Result<FetchResult, SwError> {
        let config = self.active_config.read().await.clone();
        match config {
            Some(config) => {
                let interceptor = FetchInterceptor::new(
                    config,
                    Arc::clone(&self.storage),
                    Arc::clone(&self.fetcher),
                );
                interceptor.handle(event).await
            }
            None => {
                let response = self.fetcher.fetch(&event.request).await?;
                Ok(FetchResult {
                    response,
                    source: ResponseSource::Passthrough,
                })
            }
        }
    }

    /// Handle a typed control message.
    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), SwError> {
        match message {
            ClientMessage::SkipWaiting => {
                if self.waiting_config.read().await.is_none() {
                    debug!("skip-waiting with no waiting version; ignoring");
                    return Ok(());
                }
                self.activate().await
            }
        }
    }

    /// Handle a raw message string from a page. Unrecognized messages are
    /// dropped without error.
    pub async fn handle_raw_message(&self, raw: &str) -> Result<(), SwError> {
        match ClientMessage::parse(raw) {
            Some(message) => self.handle_message(message).await,
            None => Ok(()),
        }
    }

    /// Register a page client. Pages opened while a version is active are
    /// controlled by it immediately.
    pub async fn add_client(&self, id: impl Into<String>, url: Url) {
        let id = id.into();
        self.clients.write().await.add(id.clone(), url);
        if let Some(config) = self.active_config.read().await.clone() {
            let changed = self.clients.write().await.claim(&config.version);
            for client_id in changed {
                self.emit(WorkerEvent::ControllerChange {
                    client_id,
                    version: config.version.clone(),
                });
            }
        }
        debug!(client = %id, "client registered");
    }

    /// Remove a page client. When the last client goes away and a version
    /// is waiting, it activates, matching the browser rule that a waiting
    /// worker takes over once no page depends on the old one.
    pub async fn remove_client(&self, id: &str) -> Result<(), SwError> {
        self.clients.write().await.remove(id);
        let last_client_gone = self.clients.read().await.is_empty();
        if last_client_gone && self.waiting_config.read().await.is_some() {
            info!("last client closed; promoting waiting version");
            return self.activate().await;
        }
        Ok(())
    }

    /// Version tag of the active worker, if any.
    pub async fn active_version(&self) -> Option<String> {
        self.registration
            .read()
            .await
            .active_version()
            .map(str::to_string)
    }

    /// Version tag of the waiting worker, if any.
    pub async fn waiting_version(&self) -> Option<String> {
        self.registration
            .read()
            .await
            .waiting_version()
            .map(str::to_string)
    }

    /// Names of every existing cache bucket, sorted.
    pub async fn bucket_names(&self) -> Vec<String> {
        self.storage.read().await.names()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }
}
