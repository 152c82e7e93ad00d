//! The worker: lifecycle, message channel, push and sync hooks around a
//! [`Router`].

mod clients;
mod lifecycle;
mod message;
mod push;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use clients::{ClientInfo, ClientRegistry, Clients, WindowAction};
pub use lifecycle::{LifecycleError, WorkerState};
pub use message::{ReplyPort, VersionReply, WorkerMessage};
pub use push::{ACTION_CLOSE, ACTION_EXPLORE, EXPLORE_URL, Notification, NotificationClick};

use lifecycle::{Lifecycle, precache, purge_stale};

use crate::router::{Request, Routed, Router};
use crate::sync::{SyncManager, SyncReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub claimed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    Window(WindowAction),
}

pub struct ServiceWorker {
    router: Router,
    clients: Arc<dyn Clients>,
    sync: SyncManager,
    lifecycle: Mutex<Lifecycle>,
}

impl ServiceWorker {
    pub fn new(router: Router, clients: Arc<dyn Clients>, sync: SyncManager) -> Self {
        Self {
            router,
            clients,
            sync,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn clients(&self) -> &Arc<dyn Clients> {
        &self.clients
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.lock().state()
    }

    /// Pre-caches the static manifest. On failure the worker becomes redundant
    /// and no partition is created; calling `install` again retries.
    pub async fn install(&self) -> Result<usize, LifecycleError> {
        self.lifecycle.lock().transition(WorkerState::Installing)?;
        match precache(&self.router).await {
            Ok(count) => {
                let mut lifecycle = self.lifecycle.lock();
                lifecycle.transition(WorkerState::Installed)?;
                lifecycle.request_skip_waiting();
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "install failed");
                self.lifecycle.lock().transition(WorkerState::Redundant)?;
                Err(err)
            }
        }
    }

    /// Removes partitions from other versions, then takes control of every
    /// open page.
    pub async fn activate(&self) -> Result<ActivationReport, LifecycleError> {
        self.lifecycle.lock().transition(WorkerState::Activating)?;
        match purge_stale(&self.router).await {
            Ok(deleted) => {
                self.lifecycle.lock().transition(WorkerState::Activated)?;
                let claimed = self.clients.claim();
                info!(
                    cache = %self.router.config().cache_name,
                    deleted = deleted.len(),
                    claimed,
                    "worker activated"
                );
                Ok(ActivationReport { deleted, claimed })
            }
            Err(err) => {
                warn!(error = %err, "activation failed");
                self.lifecycle.lock().transition(WorkerState::Installed)?;
                Err(err)
            }
        }
    }

    /// Installs, then activates straight away when skip-waiting was requested.
    /// Returns `None` when the worker is left waiting.
    pub async fn install_and_activate(&self) -> Result<Option<ActivationReport>, LifecycleError> {
        self.install().await?;
        if self.lifecycle.lock().skip_waiting_requested() {
            return self.activate().await.map(Some);
        }
        Ok(None)
    }

    /// Records the page a navigation loads. Pages seen before activation are
    /// left for `activate` to claim.
    pub fn observe_navigation(&self, url: &str) -> Uuid {
        let controlled = self.state() == WorkerState::Activated;
        self.clients.register(url, controlled)
    }

    /// Routes a request once the worker controls pages. Before activation
    /// requests pass through untouched.
    pub async fn fetch(&self, request: &Request) -> Routed {
        if self.state() != WorkerState::Activated {
            return Routed::passthrough();
        }
        self.router.route(request).await
    }

    pub async fn handle_message(
        &self,
        message: WorkerMessage,
        port: Option<ReplyPort>,
    ) -> Result<(), LifecycleError> {
        match message {
            WorkerMessage::SkipWaiting => {
                let waiting = {
                    let mut lifecycle = self.lifecycle.lock();
                    lifecycle.request_skip_waiting();
                    lifecycle.state() == WorkerState::Installed
                };
                if waiting {
                    self.activate().await?;
                }
            }
            WorkerMessage::GetVersion => {
                let reply = VersionReply {
                    version: self.router.config().cache_name.to_string(),
                };
                match port {
                    Some(port) => {
                        if port.send(reply).is_err() {
                            debug!("GET_VERSION reply port closed");
                        }
                    }
                    None => debug!("GET_VERSION without a reply port"),
                }
            }
        }
        Ok(())
    }

    pub fn push(&self, payload: Option<&str>) -> Notification {
        Notification::from_push(payload)
    }

    pub fn notification_click(&self, action: Option<&str>) -> ClickOutcome {
        let click = NotificationClick::from_action(action);
        if click.opens_window() {
            return ClickOutcome::Window(self.clients.focus_or_open(EXPLORE_URL));
        }
        if click == NotificationClick::Unknown {
            debug!(action = ?action, "unknown notification action");
        }
        ClickOutcome::Dismissed
    }

    pub async fn sync(&self, tag: &str) -> anyhow::Result<SyncReport> {
        self.sync.run(tag).await
    }
}
