//! Genwatch engine: backend IO, job observers and their coordination.
mod cancel;
mod client;
mod observer;
mod orchestrator;
mod persist;
mod polling;
mod reconnect;
mod sse;
mod streaming;
mod types;

pub use cancel::CancellationCoordinator;
pub use client::{ClientSettings, EventStream, GenerationBackend, ReqwestBackend};
pub use observer::{ChannelSink, ObserverHandle, ObserverRegistry, ObserverSink};
pub use orchestrator::{EngineError, EngineSettings, Orchestrator};
pub use persist::{ensure_state_dir, PersistError, SessionFile, SESSION_FILENAME};
pub use polling::{PollSettings, PollingDriver};
pub use reconnect::{ReconnectResolver, RemoteState};
pub use sse::{SseDecoder, MAX_EVENT_BYTES};
pub use streaming::{StreamSettings, StreamingDriver};
pub use types::{
    BackendError, CancelOutcome, DocumentSnapshot, EngineEvent, FailureKind, ObserverEvent,
    ObserverId, ObserverUpdate, Reconnection, StreamEvent, TerminalSnapshot, TestSnapshot,
};
