use crate::{ActiveJobSnapshot, GenerationConfig, JobId, JobKind, JobStatus, ObserverOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User edited the submission form.
    ConfigChanged {
        kind: JobKind,
        workspace_id: String,
        config: GenerationConfig,
    },
    /// User submitted the form.
    SubmitClicked,
    /// Backend accepted a submission or a restart for `job_id`.
    JobSubmitted {
        job_id: JobId,
        kind: JobKind,
        config: GenerationConfig,
    },
    /// Submission or restart was rejected before any observer started.
    SubmitFailed {
        job_id: Option<JobId>,
        message: String,
    },
    /// User (or a restored session) asked to re-attach to a job.
    ReconnectRequested { job_id: JobId, kind: JobKind },
    /// Remote job is still running and a fresh observer is attached.
    ReconnectAttached { job_id: JobId, status: JobStatus },
    /// Remote job already finished; nothing is observed.
    ReconnectTerminal {
        job_id: JobId,
        status: JobStatus,
        logs: Vec<String>,
        items: Vec<serde_json::Value>,
    },
    /// Remote status could not be fetched.
    ReconnectFailed { job_id: JobId, message: String },
    /// Observer: new log lines (suffix only).
    LogLines { job_id: JobId, lines: Vec<String> },
    /// Observer: new progress estimate.
    ProgressChanged { job_id: JobId, percent: u8 },
    /// Observer: remote status changed.
    StatusObserved { job_id: JobId, status: JobStatus },
    /// Observer: a streamed item arrived.
    ItemReceived {
        job_id: JobId,
        index: usize,
        item: serde_json::Value,
    },
    /// Observer stopped on its own.
    ObserverFinished {
        job_id: JobId,
        outcome: ObserverOutcome,
        items: Option<Vec<serde_json::Value>>,
    },
    /// User clicked Cancel.
    CancelClicked { job_id: JobId },
    /// User clicked Restart (optionally with an edited config).
    RestartClicked {
        job_id: JobId,
        config: Option<GenerationConfig>,
    },
    /// Restore jobs that were being observed when the last session ended.
    RestoreActiveJobs(Vec<ActiveJobSnapshot>),
    /// User moved the single view to another known job.
    JobFocused { job_id: JobId },
    /// The observing surface is going away.
    ViewClosed,
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
