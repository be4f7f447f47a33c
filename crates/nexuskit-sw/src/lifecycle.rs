//! Worker version lifecycle.
//!
//! `Parsed → Installing → Installed → Activating → Activated`, with the
//! terminal `Redundant` reachable from any live state (a newer version
//! installed first, or install/activation failed).

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SwError;

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Known, nothing run yet.
    Parsed,
    /// Precache in progress.
    Installing,
    /// Precached, waiting for activation.
    Installed,
    /// Janitor sweep in progress.
    Activating,
    /// Controlling; serves intercepted fetches.
    Activated,
    /// Superseded or failed. Terminal.
    Redundant,
}

fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installed, Activating)
            | (Activating, Activated)
            | (Parsed, Redundant)
            | (Installing, Redundant)
            | (Installed, Redundant)
            | (Activating, Redundant)
            | (Activated, Redundant)
    )
}

/// One installed (or installing) worker version.
#[derive(Debug, Clone)]
pub struct WorkerVersion {
    version: String,
    state: WorkerState,
    state_changed_at: Instant,
}

impl WorkerVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            state: WorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == WorkerState::Redundant
    }

    /// Apply a validated state transition.
    pub fn transition(&mut self, to: WorkerState) -> Result<(), SwError> {
        if !is_valid_transition(self.state, to) {
            return Err(SwError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(version = %self.version, from = ?self.state, to = ?to, "worker state change");
        self.state = to;
        self.state_changed_at = Instant::now();
        Ok(())
    }

    /// Force the terminal state. Never fails; redundant stays redundant.
    pub fn make_redundant(&mut self) {
        if self.state != WorkerState::Redundant {
            debug!(version = %self.version, from = ?self.state, "worker now redundant");
            self.state = WorkerState::Redundant;
            self.state_changed_at = Instant::now();
        }
    }
}

/// The installing / waiting / active slots for one scope.
#[derive(Debug, Default)]
pub struct Registration {
    pub installing: Option<WorkerVersion>,
    pub waiting: Option<WorkerVersion>,
    pub active: Option<WorkerVersion>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start installing a version. A version already in the installing slot
    /// is superseded and becomes redundant.
    pub fn begin_install(&mut self, version: &str) -> Result<(), SwError> {
        if let Some(mut superseded) = self.installing.take() {
            superseded.make_redundant();
        }
        let mut worker = WorkerVersion::new(version);
        worker.transition(WorkerState::Installing)?;
        self.installing = Some(worker);
        Ok(())
    }

    /// Precache succeeded: installing becomes the waiting version. Any
    /// previous waiting version is superseded.
    pub fn install_complete(&mut self) -> Result<(), SwError> {
        let mut worker = self
            .installing
            .take()
            .ok_or_else(|| SwError::Install("no installing version".to_string()))?;
        worker.transition(WorkerState::Installed)?;
        if let Some(mut superseded) = self.waiting.take() {
            superseded.make_redundant();
        }
        self.waiting = Some(worker);
        Ok(())
    }

    /// Precache failed: the installing version is discarded.
    pub fn install_failed(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.make_redundant();
        }
    }

    /// Start activating the waiting version (janitor runs next).
    pub fn begin_activation(&mut self) -> Result<(), SwError> {
        let worker = self.waiting.as_mut().ok_or(SwError::NoWaitingWorker)?;
        worker.transition(WorkerState::Activating)
    }

    /// Janitor done: promote to active, retiring the old active version.
    pub fn activation_complete(&mut self) -> Result<(), SwError> {
        let mut worker = self.waiting.take().ok_or(SwError::NoWaitingWorker)?;
        worker.transition(WorkerState::Activated)?;
        if let Some(mut old) = self.active.take() {
            old.make_redundant();
        }
        self.active = Some(worker);
        Ok(())
    }

    /// Activation failed: the would-be version is discarded and the old
    /// active version keeps serving.
    pub fn activation_failed(&mut self) {
        if let Some(mut worker) = self.waiting.take() {
            worker.make_redundant();
        }
    }

    /// Version tag of the active worker, if any.
    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(WorkerVersion::version)
    }

    /// Version tag of the waiting worker, if any.
    pub fn waiting_version(&self) -> Option<&str> {
        self.waiting.as_ref().map(WorkerVersion::version)
    }
}
