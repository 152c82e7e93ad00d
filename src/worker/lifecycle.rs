use futures_util::future::join_all;
use http::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::CacheError;
use crate::router::{Request, Response, Router};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

pub(super) fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;

    matches!(
        (from, to),
        (Parsed, Installing)
            | (Redundant, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            | (Activating, Activated)
            | (Activating, Installed)
            | (Activated, Redundant)
    )
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: WorkerState, to: WorkerState },
    #[error("manifest entry '{url}' is not a valid URL")]
    ManifestUrl { url: String },
    #[error("failed to fetch manifest entry {url}: {reason}")]
    ManifestFetch { url: String, reason: String },
    #[error("manifest entry {url} answered {status}")]
    ManifestStatus { url: String, status: StatusCode },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Lifecycle bookkeeping for one worker. Held under a lock that is never kept
/// across an await.
#[derive(Debug, Default)]
pub(super) struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

impl Lifecycle {
    pub(super) fn state(&self) -> WorkerState {
        self.state
    }

    pub(super) fn transition(&mut self, to: WorkerState) -> Result<WorkerState, LifecycleError> {
        let from = self.state;
        if !is_valid_transition(from, to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }
        self.state = to;
        debug!(from = from.as_str(), to = to.as_str(), "worker state changed");
        crate::metrics::record_lifecycle_state(to.as_str());
        Ok(from)
    }

    pub(super) fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub(super) fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }
}

/// Fetches every manifest URL and stores the lot in the static partition in
/// one batch. Nothing is opened or written unless every URL answered 200.
pub(super) async fn precache(router: &Router) -> Result<usize, LifecycleError> {
    let config = router.config();
    let mut requests = Vec::with_capacity(config.manifest.len());
    for url in config.manifest.iter() {
        let request = Request::get(url).map_err(|_| LifecycleError::ManifestUrl {
            url: url.to_string(),
        })?;
        requests.push(request);
    }

    let fetches = requests.iter().map(|request| router.fetcher().fetch(request));
    let results = join_all(fetches).await;

    let mut batch: Vec<(Request, Response)> = Vec::with_capacity(requests.len());
    for (request, result) in requests.into_iter().zip(results) {
        let response = result.map_err(|err| LifecycleError::ManifestFetch {
            url: request.url(),
            reason: err.to_string(),
        })?;
        if response.status != StatusCode::OK {
            return Err(LifecycleError::ManifestStatus {
                url: request.url(),
                status: response.status,
            });
        }
        batch.push((request, response));
    }

    let count = batch.len();
    let partition = router.storage().open(&config.static_cache_name).await?;
    partition.put_all(batch).await?;
    info!(
        partition = partition.name(),
        entries = count,
        "static manifest cached"
    );
    Ok(count)
}

/// Deletes every partition the current version does not own. Returns the
/// deleted names.
pub(super) async fn purge_stale(router: &Router) -> Result<Vec<String>, LifecycleError> {
    let config = router.config();
    let mut deleted = Vec::new();
    for name in router.storage().keys() {
        if config.is_current_partition(&name) {
            continue;
        }
        if router.storage().delete(&name).await? {
            info!(partition = %name, "deleted stale cache partition");
            crate::metrics::record_partition_deleted();
            deleted.push(name);
        }
    }
    Ok(deleted)
}
