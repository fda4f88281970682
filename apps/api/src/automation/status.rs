//! Process-wide automation status.
//!
//! One `AutomationMonitor` lives in `AppState`. A run obtains the only
//! `StatusWriter` through `try_begin`; everyone else reads snapshots or flips
//! the stop flag. The run slot is held for exactly as long as the writer lives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AutomationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Loading,
    Analyzing,
    Generating,
    Applying,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub vacancy_id: Uuid,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub match_score: f64,
    pub reason: String,
}

/// Everything an observer can see about the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub status: RunState,
    pub phase: Option<Phase>,
    pub message: String,
    pub vacancies_loaded: u32,
    pub vacancies_total: u32,
    pub vacancies_analyzed: u32,
    pub resumes_generated: u32,
    pub applications_sent: u32,
    pub recommendations: Vec<Recommendation>,
    pub error: Option<String>,
    pub stop_requested: bool,
}

#[derive(Default)]
struct Shared {
    status: Mutex<AutomationStatus>,
    stop: AtomicBool,
    active: AtomicBool,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, AutomationStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Default)]
pub struct AutomationMonitor {
    shared: Arc<Shared>,
}

impl AutomationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AutomationStatus {
        let mut status = self.shared.status().clone();
        status.stop_requested = self.shared.stop.load(Ordering::SeqCst);
        status
    }

    /// True while a `StatusWriter` exists.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Asks the current run to stop at its next checkpoint. Never touches anything else.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Claims the run slot and resets the record to a fresh `running` state.
    /// Fails without touching the record if a run already holds the slot.
    pub fn try_begin(&self) -> Result<StatusWriter, AutomationError> {
        self.shared
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AutomationError::AlreadyRunning)?;

        self.shared.stop.store(false, Ordering::SeqCst);
        *self.shared.status() = AutomationStatus {
            status: RunState::Running,
            ..Default::default()
        };
        Ok(StatusWriter {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Cooperative cancellation token handed to every phase.
#[derive(Clone)]
pub struct StopSignal {
    shared: Arc<Shared>,
}

impl StopSignal {
    pub fn is_set(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }
}

/// Sole writer of the status record for one run. Dropping it frees the run slot.
pub struct StatusWriter {
    shared: Arc<Shared>,
}

impl StatusWriter {
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut AutomationStatus)) {
        let mut status = self.shared.status();
        f(&mut *status);
    }

    pub fn enter_phase(&self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.phase = Some(phase);
            s.message = message;
        });
    }

    pub fn message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.message = message);
    }

    pub fn complete(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.status = RunState::Completed;
            s.message = message;
        });
    }

    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| {
            s.status = RunState::Error;
            s.message = format!("Error: {error}");
            s.error = Some(error);
        });
    }
}

impl Drop for StatusWriter {
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
    }
}
