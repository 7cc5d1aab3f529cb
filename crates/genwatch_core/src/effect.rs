use crate::{GenerationConfig, JobId, JobKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create the resource and trigger generation.
    Submit {
        kind: JobKind,
        workspace_id: String,
        config: GenerationConfig,
    },
    /// Attach a fresh polling or streaming observer.
    StartObserver {
        job_id: JobId,
        kind: JobKind,
        question_count: u32,
    },
    /// Tear down the local observer without touching the remote job.
    StopObserver { job_id: JobId },
    /// Stop observing and ask the backend to cancel (best effort).
    Cancel { job_id: JobId, kind: JobKind },
    /// Resolve the remote status and re-attach if still running.
    Reconnect { job_id: JobId, kind: JobKind },
    /// Start a new attempt against the same id.
    Restart {
        job_id: JobId,
        config: Option<GenerationConfig>,
    },
    /// One-time: show the finished result.
    OpenResult { job_id: JobId, kind: JobKind },
    /// One-time: clear the submission form.
    ResetForm,
}
