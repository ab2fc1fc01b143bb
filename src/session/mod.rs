//! Pipeline run sessions.
//!
//! | Module | Contents |
//! |--------|----------|
//! | `events` | `SessionEvent`, `ProgressEvent`, `Broadcaster` |
//! | `orchestrator` | spawning and supervising the pipeline process |
//! | `progress` | polling watcher for a run's pipeline directory |
//!
//! A session is keyed by run id (the config stem) and lives in the
//! [`SessionRegistry`] for the life of the server once it has launched. Its
//! state moves `Idle -> Launching -> Running -> Completed | Failed`, and back
//! to `Idle` when a new launch is accepted.

pub mod events;
pub mod orchestrator;
pub mod progress;

pub use events::{
    Broadcaster, ChangeKind, ProgressEvent, SessionEvent, StreamEvent, Subscription,
};
pub use orchestrator::ProcessOrchestrator;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::LaunchError;
use crate::launch::LaunchCommand;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Launching,
    Running,
    Completed { exit_code: i32 },
    Failed { error: String },
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// A process is being started or is alive.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Launching | Self::Running)
    }
}

/// Check whether a session state transition is allowed.
pub fn is_valid_transition(from: &SessionState, to: &SessionState) -> bool {
    use SessionState::*;
    matches!(
        (from, to),
        (Idle, Launching)
            | (Launching, Running)
            | (Launching, Failed { .. })
            | (Running, Completed { .. })
            | (Running, Failed { .. })
            | (Completed { .. }, Idle)
            | (Failed { .. }, Idle)
    )
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    command: Option<LaunchCommand>,
    launched_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// One run's lifecycle and its two output channels.
#[derive(Debug)]
pub struct ProcessSession {
    run_id: String,
    inner: Mutex<Inner>,
    logs: Broadcaster<SessionEvent>,
    progress: Broadcaster<ProgressEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub run_id: String,
    pub state: SessionState,
    pub command: Option<Vec<String>>,
    pub launched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log_subscribers: usize,
    pub progress_subscribers: usize,
}

impl ProcessSession {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                command: None,
                launched_at: None,
                finished_at: None,
            }),
            logs: Broadcaster::new(),
            progress: Broadcaster::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Whether this session has ever accepted a launch.
    pub fn has_launched(&self) -> bool {
        self.lock().launched_at.is_some()
    }

    pub fn logs(&self) -> &Broadcaster<SessionEvent> {
        &self.logs
    }

    pub fn progress(&self) -> &Broadcaster<ProgressEvent> {
        &self.progress
    }

    /// Move to `to` if the transition is allowed. Returns whether it happened.
    pub fn transition(&self, to: SessionState) -> bool {
        self.apply(&mut self.lock(), to)
    }

    fn apply(&self, inner: &mut Inner, to: SessionState) -> bool {
        if !is_valid_transition(&inner.state, &to) {
            tracing::warn!(
                run_id = %self.run_id,
                from = inner.state.as_str(),
                to = to.as_str(),
                "Ignoring invalid session transition"
            );
            return false;
        }
        if matches!(to, SessionState::Completed { .. } | SessionState::Failed { .. }) {
            inner.finished_at = Some(Utc::now());
        }
        inner.state = to;
        true
    }

    /// Accept a new launch: a finished session returns to idle first, an
    /// active one is busy.
    pub fn begin_launch(&self, command: &LaunchCommand) -> Result<(), LaunchError> {
        let mut inner = self.lock();
        if inner.state.is_active() {
            return Err(LaunchError::SessionBusy {
                run_id: self.run_id.clone(),
            });
        }
        if inner.state != SessionState::Idle {
            self.apply(&mut inner, SessionState::Idle);
        }
        self.apply(&mut inner, SessionState::Launching);
        inner.command = Some(command.clone());
        inner.launched_at = Some(Utc::now());
        inner.finished_at = None;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            run_id: self.run_id.clone(),
            state: inner.state.clone(),
            command: inner.command.as_ref().map(|c| c.argv.clone()),
            launched_at: inner.launched_at,
            finished_at: inner.finished_at,
            log_subscribers: self.logs.subscriber_count(),
            progress_subscribers: self.progress.subscriber_count(),
        }
    }
}

/// Sessions keyed by run id.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<ProcessSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ProcessSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, run_id: &str) -> Option<Arc<ProcessSession>> {
        self.lock().get(run_id).cloned()
    }

    /// The session for `run_id`, created idle when absent.
    pub fn get_or_create(&self, run_id: &str) -> Arc<ProcessSession> {
        Self::entry(&mut self.lock(), run_id)
    }

    fn entry(
        sessions: &mut HashMap<String, Arc<ProcessSession>>,
        run_id: &str,
    ) -> Arc<ProcessSession> {
        Arc::clone(
            sessions
                .entry(run_id.to_string())
                .or_insert_with(|| Arc::new(ProcessSession::new(run_id))),
        )
    }

    /// Accept a launch for `run_id`, creating the session when absent.
    pub fn begin_launch(
        &self,
        run_id: &str,
        command: &LaunchCommand,
    ) -> Result<Arc<ProcessSession>, LaunchError> {
        let mut sessions = self.lock();
        let session = Self::entry(&mut sessions, run_id);
        session.begin_launch(command)?;
        Ok(session)
    }

    /// Whether `run_id` has a process starting or alive.
    pub fn is_active(&self, run_id: &str) -> bool {
        self.get(run_id).is_some_and(|s| s.state().is_active())
    }

    /// Subscribe to the log of `run_id`, which may not have launched yet.
    ///
    /// A session created only for listeners is dropped again once its last
    /// listener leaves without a launch having happened.
    pub fn subscribe_logs(&self, run_id: &str) -> Subscription<SessionEvent> {
        let mut sessions = self.lock();
        let rx = Self::entry(&mut sessions, run_id).logs().subscribe();
        drop(sessions);

        let registry = self.clone();
        let id = run_id.to_string();
        rx.on_drop(move || registry.remove_unlaunched(&id))
    }

    fn remove_unlaunched(&self, run_id: &str) {
        let mut sessions = self.lock();
        let unused = sessions.get(run_id).is_some_and(|s| {
            !s.has_launched()
                && s.logs().subscriber_count() == 0
                && s.progress().subscriber_count() == 0
        });
        if unused {
            sessions.remove(run_id);
            tracing::debug!(run_id, "Dropped session that never launched");
        }
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<_> = self.lock().values().map(|s| s.snapshot()).collect();
        all.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        all
    }
}
