use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use genwatch_core::{GenerationConfig, JobId, JobKind, JobStatus, ObserverOutcome};
use serde::Deserialize;

/// Identifies one attachment of an observer to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverUpdate {
    LogLines(Vec<String>),
    Progress(u8),
    Status(JobStatus),
    Item {
        index: usize,
        item: serde_json::Value,
    },
    Finished {
        outcome: ObserverOutcome,
        items: Option<Vec<serde_json::Value>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObserverEvent {
    pub observer: ObserverId,
    pub job_id: JobId,
    pub update: ObserverUpdate,
}

impl ObserverEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self.update, ObserverUpdate::Finished { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// Observer stopped and the backend accepted the cancel request.
    Acknowledged,
    /// Observer stopped; the backend request failed and was ignored.
    RemoteFailed(BackendError),
    /// Observer stopped; this kind of job has no remote cancel.
    LocalOnly,
    /// Nothing was observing the job.
    AlreadyStopped,
}

/// Everything the engine reports back to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Submitted {
        job_id: JobId,
        kind: JobKind,
        config: GenerationConfig,
    },
    SubmitFailed {
        job_id: Option<JobId>,
        error: BackendError,
    },
    Restarted {
        job_id: JobId,
        config: Option<GenerationConfig>,
    },
    Observer(ObserverEvent),
    ReconnectAttached {
        job_id: JobId,
        status: JobStatus,
    },
    ReconnectTerminal {
        job_id: JobId,
        snapshot: TerminalSnapshot,
    },
    ReconnectFailed {
        job_id: JobId,
        error: BackendError,
    },
    CancelFinished {
        job_id: JobId,
        outcome: CancelOutcome,
    },
}

/// State of a job found already finished when reconnecting.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSnapshot {
    pub status: JobStatus,
    pub logs: Vec<String>,
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconnection {
    /// A fresh observer now watches the job.
    Attached {
        status: JobStatus,
        observer: ObserverId,
    },
    /// The job finished while nobody watched; nothing was attached.
    Terminal(TerminalSnapshot),
}

/// `GET /documents/{id}` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub generation_log: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// `GET /tests/{id}` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub questions: Vec<serde_json::Value>,
}

/// One decoded server-sent event of a question stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Question { question: serde_json::Value },
    Complete,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl StreamEvent {
    pub fn parse(data: &str) -> Result<Self, BackendError> {
        serde_json::from_str(data)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "malformed response"),
        }
    }
}
