use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use genwatch_core::{
    estimate_progress, JobId, JobKind, JobStatus, LogCursor, ObserverOutcome, PROGRESS_DONE,
};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::observer::{Emitter, ObserverHandle, ObserverSink};
use crate::{GenerationBackend, ObserverUpdate};

pub(crate) const COMPLETION_LINE: &str = "Generation complete. Preparing document...";
pub(crate) const FAILURE_LINE: &str = "Generation failed.";
pub(crate) const CANCELLED_LINE: &str = "Generation was cancelled.";
pub(crate) const ABANDONED_LINE: &str =
    "Stopped watching: generation is taking longer than expected. It may still finish in the background.";

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_polls: u32,
    /// Pause between observing completion and reporting it.
    pub completion_grace: Duration,
}

impl PollSettings {
    /// Wall-clock budget for one attachment: `interval × max_polls`.
    pub fn deadline(&self) -> Duration {
        self.interval.saturating_mul(self.max_polls)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            max_polls: 400,
            completion_grace: Duration::from_millis(1500),
        }
    }
}

/// Pull-based observer for document generation jobs.
#[derive(Clone)]
pub struct PollingDriver {
    backend: Arc<dyn GenerationBackend>,
    settings: PollSettings,
}

impl PollingDriver {
    pub fn new(backend: Arc<dyn GenerationBackend>, settings: PollSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Spawns the poll loop on the current tokio runtime.
    pub fn start(&self, job_id: JobId, sink: Arc<dyn ObserverSink>) -> ObserverHandle {
        self.spawn(job_id, sink, None)
    }

    /// Like `start`, but the loop does nothing until `gate` fires.
    pub(crate) fn spawn(
        &self,
        job_id: JobId,
        sink: Arc<dyn ObserverSink>,
        gate: Option<oneshot::Receiver<()>>,
    ) -> ObserverHandle {
        let emitter = Emitter::new(job_id.clone(), sink);
        let observer = emitter.observer;
        let token = emitter.token.clone();
        let backend = self.backend.clone();
        let settings = self.settings.clone();
        engine_debug!("job {}: starting poll observer {}", job_id, observer);
        let task = tokio::spawn(async move {
            if !emitter.wait_for(gate).await {
                return;
            }
            poll_loop(backend.as_ref(), &settings, &emitter).await;
        });
        ObserverHandle::new(observer, job_id, JobKind::Document, token, task)
    }

    pub fn stop(&self, handle: &ObserverHandle) {
        handle.stop();
    }
}

async fn poll_loop(backend: &dyn GenerationBackend, settings: &PollSettings, emitter: &Emitter) {
    let job_id = &emitter.job_id;
    let token = &emitter.token;
    let started = Instant::now();
    let deadline = settings.deadline();
    let mut ticker = tokio::time::interval_at(started + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut poll_count: u32 = 0;
    let mut cursor = LogCursor::new();
    let mut last_status: Option<JobStatus> = None;
    let mut last_progress: u8 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        poll_count = poll_count.saturating_add(1);

        if started.elapsed() > deadline {
            engine_warn!(
                "job {}: no terminal status after {} polls, abandoning observation",
                job_id,
                poll_count - 1
            );
            emitter.emit(ObserverUpdate::LogLines(vec![ABANDONED_LINE.to_string()]));
            emitter.emit(ObserverUpdate::Finished {
                outcome: ObserverOutcome::Abandoned,
                items: None,
            });
            return;
        }

        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            fetched = backend.fetch_document(job_id) => fetched,
        };
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(err) => {
                engine_debug!("job {}: poll {} failed: {}", job_id, poll_count, err);
                continue;
            }
        };
        if token.is_cancelled() {
            return;
        }

        let fresh = cursor.advance(&snapshot.generation_log);
        if !fresh.is_empty() {
            emitter.emit(ObserverUpdate::LogLines(fresh.to_vec()));
        }
        if last_status != Some(snapshot.status) {
            last_status = Some(snapshot.status);
            emitter.emit(ObserverUpdate::Status(snapshot.status));
        }

        match snapshot.status {
            JobStatus::Pending => {}
            JobStatus::Generating => {
                let estimate = estimate_progress(poll_count);
                if estimate > last_progress {
                    last_progress = estimate;
                    emitter.emit(ObserverUpdate::Progress(estimate));
                }
            }
            JobStatus::Completed => {
                engine_info!("job {}: completed after {} polls", job_id, poll_count);
                emitter.emit(ObserverUpdate::LogLines(vec![COMPLETION_LINE.to_string()]));
                emitter.emit(ObserverUpdate::Progress(PROGRESS_DONE));
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(settings.completion_grace) => {}
                }
                emitter.emit(ObserverUpdate::Finished {
                    outcome: ObserverOutcome::Completed,
                    items: None,
                });
                return;
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                let (line, outcome) = if snapshot.status == JobStatus::Failed {
                    (FAILURE_LINE, ObserverOutcome::Failed)
                } else {
                    (CANCELLED_LINE, ObserverOutcome::Cancelled)
                };
                engine_info!("job {}: {}", job_id, snapshot.status.label());
                emitter.emit(ObserverUpdate::LogLines(vec![line.to_string()]));
                emitter.emit(ObserverUpdate::Finished {
                    outcome,
                    items: None,
                });
                return;
            }
        }
    }
}
