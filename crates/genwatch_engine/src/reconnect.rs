use std::sync::Arc;

use engine_logging::engine_info;
use genwatch_core::{GenerationConfig, JobId, JobKind, JobStatus};
use tokio::sync::oneshot;

use crate::observer::ObserverSink;
use crate::{
    BackendError, GenerationBackend, ObserverId, ObserverRegistry, PollingDriver, Reconnection,
    StreamingDriver, TerminalSnapshot,
};

/// Re-attaches a fresh observer to a job that may still be running.
#[derive(Clone)]
pub struct ReconnectResolver {
    backend: Arc<dyn GenerationBackend>,
    registry: Arc<ObserverRegistry>,
    polling: PollingDriver,
    streaming: StreamingDriver,
}

impl ReconnectResolver {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        registry: Arc<ObserverRegistry>,
        polling: PollingDriver,
        streaming: StreamingDriver,
    ) -> Self {
        Self {
            backend,
            registry,
            polling,
            streaming,
        }
    }

    /// Must run inside a tokio runtime; the attached driver is spawned on it.
    pub async fn reconnect(
        &self,
        job_id: &JobId,
        kind: JobKind,
        sink: Arc<dyn ObserverSink>,
    ) -> Result<Reconnection, BackendError> {
        match self.probe(job_id, kind).await? {
            RemoteState::Finished(snapshot) => Ok(Reconnection::Terminal(snapshot)),
            RemoteState::Running(status) => {
                let observer = self.attach(job_id, kind, sink);
                Ok(Reconnection::Attached { status, observer })
            }
        }
    }

    /// Fetches the current remote status without attaching anything.
    pub async fn probe(&self, job_id: &JobId, kind: JobKind) -> Result<RemoteState, BackendError> {
        let snapshot = match kind {
            JobKind::Document => {
                let document = self.backend.fetch_document(job_id).await?;
                TerminalSnapshot {
                    status: document.status,
                    logs: document.generation_log,
                    items: Vec::new(),
                }
            }
            JobKind::TestQuestions => {
                let test = self.backend.fetch_test(job_id).await?;
                TerminalSnapshot {
                    status: test.status,
                    logs: Vec::new(),
                    items: test.questions,
                }
            }
        };
        if snapshot.status.is_terminal() {
            engine_info!("job {}: already {}, nothing to attach", job_id, snapshot.status.label());
            return Ok(RemoteState::Finished(snapshot));
        }
        Ok(RemoteState::Running(snapshot.status))
    }

    /// Starts a brand-new driver (poll count and log cursor from zero) and
    /// registers it, replacing any previous observer of the job.
    pub fn attach(&self, job_id: &JobId, kind: JobKind, sink: Arc<dyn ObserverSink>) -> ObserverId {
        self.attach_announced(job_id, kind, sink, |_| {})
    }

    /// Same as `attach`, but runs `announce` once the observer is registered
    /// and before the driver emits anything. A stop issued in reaction to the
    /// announcement therefore finds the new observer.
    pub fn attach_announced(
        &self,
        job_id: &JobId,
        kind: JobKind,
        sink: Arc<dyn ObserverSink>,
        announce: impl FnOnce(ObserverId),
    ) -> ObserverId {
        let (open, gate) = oneshot::channel();
        let handle = match kind {
            JobKind::Document => self.polling.spawn(job_id.clone(), sink, Some(gate)),
            JobKind::TestQuestions => self.streaming.spawn(
                job_id.clone(),
                GenerationConfig::DEFAULT_QUESTION_COUNT,
                sink,
                Some(gate),
            ),
        };
        let observer = handle.id();
        self.registry.insert(handle);
        engine_info!("job {}: reattached as {}", job_id, observer);
        announce(observer);
        let _ = open.send(());
        observer
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteState {
    Running(JobStatus),
    Finished(TerminalSnapshot),
}
