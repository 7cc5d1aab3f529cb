use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-assigned identifier of a document or test resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for JobId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Document,
    TestQuestions,
}

impl JobKind {
    pub fn label(self) -> &'static str {
        match self {
            JobKind::Document => "document",
            JobKind::TestQuestions => "test questions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebSearchMode {
    #[default]
    Off,
    Auto,
    Required,
}

/// Submission parameters for a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub web_search: WebSearchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIssue {
    #[error("a title is required")]
    MissingTitle,
    #[error("page count must be at least 1")]
    ZeroPages,
    #[error("question count must be at least 1")]
    ZeroQuestions,
}

impl GenerationConfig {
    /// Question count used when a test-question request does not specify one.
    pub const DEFAULT_QUESTION_COUNT: u32 = 10;

    pub fn validate(&self) -> Result<(), ConfigIssue> {
        if self.title.trim().is_empty() {
            return Err(ConfigIssue::MissingTitle);
        }
        if self.page_count == Some(0) {
            return Err(ConfigIssue::ZeroPages);
        }
        if self.question_count == Some(0) {
            return Err(ConfigIssue::ZeroQuestions);
        }
        Ok(())
    }

    pub fn effective_question_count(&self) -> u32 {
        self.question_count.unwrap_or(Self::DEFAULT_QUESTION_COUNT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal automatic transition from `self`.
    ///
    /// Transitions only move forward: pending may go anywhere else, generating
    /// only to a terminal state, and terminal states never move.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Generating => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How an observer stopped watching a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverOutcome {
    /// Polling saw `completed`.
    Completed,
    /// Polling saw `failed`.
    Failed,
    /// Polling saw `cancelled`.
    Cancelled,
    /// Local deadline passed; the remote job state is unknown.
    Abandoned,
    /// Stream finished with `complete`.
    Ready,
    /// Stream errored or ended early; partial results are kept.
    Degraded,
    /// Stream hit its wall-clock cap; partial results are kept.
    TimedOut,
}

impl ObserverOutcome {
    /// Outcomes after which the UI proceeds to a ready state.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Ready | Self::Degraded | Self::TimedOut
        )
    }

    /// The remote status this outcome proves, if any.
    pub fn observed_status(self) -> Option<JobStatus> {
        match self {
            Self::Completed | Self::Ready => Some(JobStatus::Completed),
            Self::Failed => Some(JobStatus::Failed),
            Self::Cancelled => Some(JobStatus::Cancelled),
            Self::Abandoned | Self::Degraded | Self::TimedOut => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Abandoned => "abandoned",
            Self::Ready => "ready",
            Self::Degraded => "ready (partial)",
            Self::TimedOut => "ready (timed out)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Advanced { from: JobStatus, to: JobStatus },
    Unchanged,
    Rejected { current: JobStatus, requested: JobStatus },
}

/// Client-side mirror of one attempt of a generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    id: JobId,
    kind: JobKind,
    config: GenerationConfig,
    attempt: u32,
    status: JobStatus,
    logs: Vec<String>,
    progress: u8,
    items: Vec<serde_json::Value>,
}

impl JobHandle {
    pub fn new(id: JobId, kind: JobKind, config: GenerationConfig) -> Self {
        Self {
            id,
            kind,
            config,
            attempt: 1,
            status: JobStatus::Pending,
            logs: Vec::new(),
            progress: 0,
            items: Vec::new(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn items(&self) -> &[serde_json::Value] {
        &self.items
    }

    pub fn apply_status(&mut self, next: JobStatus) -> StatusChange {
        if next == self.status {
            return StatusChange::Unchanged;
        }
        if !self.status.can_advance_to(next) {
            return StatusChange::Rejected {
                current: self.status,
                requested: next,
            };
        }
        let from = self.status;
        self.status = next;
        if next == JobStatus::Completed {
            self.progress = crate::PROGRESS_DONE;
        }
        StatusChange::Advanced { from, to: next }
    }

    /// Appends log lines; returns how many were added.
    pub fn append_logs<I>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.logs.len();
        self.logs.extend(lines);
        self.logs.len() - before
    }

    /// Records a progress estimate. Never decreases, and only a completed
    /// job may report 100.
    pub fn record_progress(&mut self, percent: u8) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let capped = percent.min(crate::PROGRESS_DONE - 1);
        if capped <= self.progress {
            return false;
        }
        self.progress = capped;
        true
    }

    /// Accepts a streamed item only at the next free position.
    pub fn push_item(&mut self, index: usize, item: serde_json::Value) -> bool {
        if index != self.items.len() {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn replace_items(&mut self, items: Vec<serde_json::Value>) {
        self.items = items;
    }

    /// Drops the mirrored logs and items before a fresh observer refills them.
    pub fn reset_observation(&mut self) {
        self.logs.clear();
        self.items.clear();
    }

    /// Starts a fresh attempt against the same id. Only valid from a terminal status.
    pub fn begin_new_attempt(&mut self, config: Option<GenerationConfig>) -> Option<u32> {
        if !self.status.is_terminal() {
            return None;
        }
        if let Some(config) = config {
            self.config = config;
        }
        self.attempt += 1;
        self.status = JobStatus::Pending;
        self.logs.clear();
        self.progress = 0;
        self.items.clear();
        Some(self.attempt)
    }
}
