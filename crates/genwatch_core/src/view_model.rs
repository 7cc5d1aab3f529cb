use crate::{JobId, JobKind, JobStatus, Phase};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub phase: Phase,
    pub focused: Option<JobRowView>,
    pub jobs: Vec<JobRowView>,
    pub form_error: Option<String>,
    pub submitting: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub kind: JobKind,
    pub title: String,
    pub attempt: u32,
    pub status: JobStatus,
    pub phase: Phase,
    pub progress: u8,
    pub log_count: usize,
    pub item_count: usize,
    pub error: Option<String>,
}
