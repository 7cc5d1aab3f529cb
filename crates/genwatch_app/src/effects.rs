use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use genwatch_core::{Effect, JobId, Msg, ProjectorState};
use genwatch_engine::{
    BackendError, CancelOutcome, EngineError, EngineEvent, EngineSettings, ObserverEvent,
    ObserverUpdate, Orchestrator,
};

/// Turns projector effects into engine calls and engine events back into messages.
pub struct EffectRunner {
    engine: Orchestrator,
}

impl EffectRunner {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        Ok(Self {
            engine: Orchestrator::new(settings)?,
        })
    }

    #[cfg(test)]
    pub fn with_engine(engine: Orchestrator) -> Self {
        Self { engine }
    }

    /// Hands engine-bound effects to the orchestrator and returns the ones
    /// the surface has to present itself.
    pub fn enqueue(&self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut presented = Vec::new();
        for effect in effects {
            match effect {
                Effect::Submit {
                    kind,
                    workspace_id,
                    config,
                } => {
                    engine_info!(
                        "Submit kind={} workspace={} title={:?}",
                        kind.label(),
                        workspace_id,
                        config.title
                    );
                    self.engine.submit(kind, workspace_id, config);
                }
                Effect::StartObserver {
                    job_id,
                    kind,
                    question_count,
                } => {
                    engine_debug!("StartObserver job_id={} kind={}", job_id, kind.label());
                    self.engine.start_observer(job_id, kind, question_count);
                }
                Effect::StopObserver { job_id } => {
                    let stopped = self.engine.stop_observer(&job_id);
                    engine_debug!("StopObserver job_id={} stopped={}", job_id, stopped);
                }
                Effect::Cancel { job_id, kind } => {
                    engine_info!("Cancel job_id={} kind={}", job_id, kind.label());
                    self.engine.cancel(job_id);
                }
                Effect::Reconnect { job_id, kind } => {
                    engine_info!("Reconnect job_id={} kind={}", job_id, kind.label());
                    self.engine.reconnect(job_id, kind);
                }
                Effect::Restart { job_id, config } => {
                    engine_info!("Restart job_id={} edited={}", job_id, config.is_some());
                    self.engine.restart(job_id, config);
                }
                Effect::OpenResult { .. } | Effect::ResetForm => presented.push(effect),
            }
        }
        presented
    }

    pub fn next_event(&self, timeout: Duration) -> Option<EngineEvent> {
        self.engine.recv_timeout(timeout)
    }

    pub fn answer(&self, job_id: &JobId, question_id: &str, answer: &str) -> Result<(), BackendError> {
        self.engine.answer(job_id, question_id, answer)
    }

    pub fn complete_test(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.engine.complete_test(job_id)
    }
}

/// Maps an engine event onto the projector message it stands for.
///
/// Cancel outcomes carry no state change and map to `None`.
pub fn event_to_msg(event: EngineEvent, state: &ProjectorState) -> Option<Msg> {
    let msg = match event {
        EngineEvent::Submitted {
            job_id,
            kind,
            config,
        } => Msg::JobSubmitted {
            job_id,
            kind,
            config,
        },
        EngineEvent::SubmitFailed { job_id, error } => Msg::SubmitFailed {
            job_id,
            message: error.to_string(),
        },
        EngineEvent::Restarted { job_id, config } => {
            let Some(handle) = state.handle(&job_id) else {
                engine_warn!("Restart acknowledged for unknown job {}", job_id);
                return None;
            };
            Msg::JobSubmitted {
                kind: handle.kind(),
                config: config.unwrap_or_else(|| handle.config().clone()),
                job_id,
            }
        }
        EngineEvent::Observer(ObserverEvent { job_id, update, .. }) => match update {
            ObserverUpdate::LogLines(lines) => Msg::LogLines { job_id, lines },
            ObserverUpdate::Progress(percent) => Msg::ProgressChanged { job_id, percent },
            ObserverUpdate::Status(status) => Msg::StatusObserved { job_id, status },
            ObserverUpdate::Item { index, item } => Msg::ItemReceived {
                job_id,
                index,
                item,
            },
            ObserverUpdate::Finished { outcome, items } => Msg::ObserverFinished {
                job_id,
                outcome,
                items,
            },
        },
        EngineEvent::ReconnectAttached { job_id, status } => {
            Msg::ReconnectAttached { job_id, status }
        }
        EngineEvent::ReconnectTerminal { job_id, snapshot } => Msg::ReconnectTerminal {
            job_id,
            status: snapshot.status,
            logs: snapshot.logs,
            items: snapshot.items,
        },
        EngineEvent::ReconnectFailed { job_id, error } => Msg::ReconnectFailed {
            job_id,
            message: error.to_string(),
        },
        EngineEvent::CancelFinished { job_id, outcome } => {
            match &outcome {
                CancelOutcome::RemoteFailed(err) => {
                    engine_warn!("Job {}: backend cancel failed: {}", job_id, err)
                }
                other => engine_info!("Job {}: cancel finished: {:?}", job_id, other),
            }
            return None;
        }
    };
    Some(msg)
}
