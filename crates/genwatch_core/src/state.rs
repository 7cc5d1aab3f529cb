use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::view_model::{AppViewModel, JobRowView};
use crate::{GenerationConfig, JobHandle, JobId, JobKind, JobStatus, ObserverOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Polling,
    Streaming,
}

impl Transport {
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Document => Transport::Polling,
            JobKind::TestQuestions => Transport::Streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Failed,
    Cancelled,
    Abandoned,
    Unreachable,
}

/// UI-visible state of the surface or of one observed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing submitted yet; the form is shown.
    #[default]
    Configuring,
    /// Waiting for the remote status before deciding how to attach.
    Connecting,
    Observing { transport: Transport },
    /// Observer torn down locally while the job may still run remotely.
    Detached,
    Ready { outcome: ObserverOutcome },
    Aborted { reason: AbortReason },
}

impl Phase {
    /// Projects a remote status onto the phase shown for a job of `kind`.
    pub fn from_status(status: JobStatus, kind: JobKind) -> Self {
        match status {
            JobStatus::Pending | JobStatus::Generating => Phase::Observing {
                transport: Transport::for_kind(kind),
            },
            JobStatus::Completed => Phase::Ready {
                outcome: match kind {
                    JobKind::Document => ObserverOutcome::Completed,
                    JobKind::TestQuestions => ObserverOutcome::Ready,
                },
            },
            JobStatus::Failed => Phase::Aborted {
                reason: AbortReason::Failed,
            },
            JobStatus::Cancelled => Phase::Aborted {
                reason: AbortReason::Cancelled,
            },
        }
    }

    pub fn from_outcome(outcome: ObserverOutcome) -> Self {
        match outcome {
            ObserverOutcome::Failed => Phase::Aborted {
                reason: AbortReason::Failed,
            },
            ObserverOutcome::Cancelled => Phase::Aborted {
                reason: AbortReason::Cancelled,
            },
            ObserverOutcome::Abandoned => Phase::Aborted {
                reason: AbortReason::Abandoned,
            },
            ObserverOutcome::Completed
            | ObserverOutcome::Ready
            | ObserverOutcome::Degraded
            | ObserverOutcome::TimedOut => Phase::Ready { outcome },
        }
    }

    /// A live observer exists (or is being attached) for the job.
    pub fn has_observer(self) -> bool {
        matches!(self, Phase::Connecting | Phase::Observing { .. })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ready { .. } | Phase::Aborted { .. })
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Configuring => "configuring",
            Phase::Connecting => "connecting",
            Phase::Observing { .. } => "observing",
            Phase::Detached => "detached",
            Phase::Ready { .. } => "ready",
            Phase::Aborted { .. } => "aborted",
        }
    }
}

/// Persisted form of a job that was still running when a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveJobSnapshot {
    pub job_id: JobId,
    pub kind: JobKind,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObservedJob {
    pub(crate) handle: JobHandle,
    pub(crate) phase: Phase,
    /// Set once the terminal side effects for the current attempt were emitted.
    pub(crate) terminal_handled: bool,
    pub(crate) restart_pending: bool,
    /// Cancelled while the reconnect status fetch was in flight; the remote
    /// cancel goes out once that fetch finds the job still running.
    pub(crate) cancel_pending: bool,
    pub(crate) last_error: Option<String>,
}

impl ObservedJob {
    pub(crate) fn new(handle: JobHandle, phase: Phase) -> Self {
        Self {
            handle,
            phase,
            terminal_handled: false,
            restart_pending: false,
            cancel_pending: false,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct FormState {
    pub(crate) kind: Option<JobKind>,
    pub(crate) workspace_id: String,
    pub(crate) config: GenerationConfig,
    pub(crate) submitting: bool,
    pub(crate) error: Option<String>,
}

/// Whole projector state: the submission form plus one entry per known job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectorState {
    pub(crate) form: FormState,
    pub(crate) jobs: BTreeMap<JobId, ObservedJob>,
    pub(crate) focused: Option<JobId>,
    dirty: bool,
}

impl ProjectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        let jobs: Vec<JobRowView> = self.jobs.values().map(row_view).collect();
        let focused = self
            .focused
            .as_ref()
            .and_then(|id| jobs.iter().find(|row| &row.job_id == id).cloned());
        AppViewModel {
            phase: self.phase(),
            focused,
            jobs,
            form_error: self.form.error.clone(),
            submitting: self.form.submitting,
            dirty: self.dirty,
        }
    }

    /// Phase of the single UI surface: the focused job's phase, or the form.
    pub fn phase(&self) -> Phase {
        self.focused
            .as_ref()
            .and_then(|id| self.jobs.get(id))
            .map(|job| job.phase)
            .unwrap_or(Phase::Configuring)
    }

    pub fn job_phase(&self, job_id: &JobId) -> Option<Phase> {
        self.jobs.get(job_id).map(|job| job.phase)
    }

    pub fn handle(&self, job_id: &JobId) -> Option<&JobHandle> {
        self.jobs.get(job_id).map(|job| &job.handle)
    }

    pub fn focused(&self) -> Option<&JobId> {
        self.focused.as_ref()
    }

    /// Whether some cancel still waits for its reconnect to resolve.
    pub fn has_pending_cancel(&self) -> bool {
        self.jobs.values().any(|job| job.cancel_pending)
    }

    /// Jobs that may still be running remotely and are worth reconnecting to.
    pub fn active_jobs_snapshot(&self) -> Vec<ActiveJobSnapshot> {
        self.jobs
            .values()
            .filter(|job| matches!(job.phase, Phase::Connecting | Phase::Observing { .. } | Phase::Detached))
            .map(|job| ActiveJobSnapshot {
                job_id: job.handle.id().clone(),
                kind: job.handle.kind(),
                title: job.handle.config().title.clone(),
            })
            .collect()
    }

    /// Returns whether the view changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

fn row_view(job: &ObservedJob) -> JobRowView {
    let handle = &job.handle;
    JobRowView {
        job_id: handle.id().clone(),
        kind: handle.kind(),
        title: handle.config().title.clone(),
        attempt: handle.attempt(),
        status: handle.status(),
        phase: job.phase,
        progress: handle.progress(),
        log_count: handle.logs().len(),
        item_count: handle.items().len(),
        error: job.last_error.clone(),
    }
}
