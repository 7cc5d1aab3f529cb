//! Genwatch core: pure job model, projector state machine and view-model helpers.
mod effect;
mod job;
mod msg;
mod progress;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use job::{
    ConfigIssue, GenerationConfig, JobHandle, JobId, JobKind, JobStatus, ObserverOutcome,
    StatusChange, WebSearchMode,
};
pub use msg::Msg;
pub use progress::{estimate_progress, LogCursor, PROGRESS_CEILING, PROGRESS_DONE, PROGRESS_FLOOR};
pub use state::{AbortReason, ActiveJobSnapshot, Phase, ProjectorState, Transport};
pub use update::update;
pub use view_model::{AppViewModel, JobRowView};
