use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use engine_logging::{engine_info, engine_trace, engine_warn};
use genwatch_core::{GenerationConfig, JobId, JobKind};

use crate::observer::{ChannelSink, ObserverSink};
use crate::reconnect::RemoteState;
use crate::{
    BackendError, CancellationCoordinator, ClientSettings, EngineEvent, GenerationBackend,
    ObserverRegistry, PollSettings, PollingDriver, ReconnectResolver, ReqwestBackend,
    StreamSettings, StreamingDriver,
};

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub client: ClientSettings,
    pub poll: PollSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Synchronous front of the engine: owns the runtime, the drivers and the
/// observer registry, and hands results back as [`EngineEvent`]s.
pub struct Orchestrator {
    runtime: tokio::runtime::Runtime,
    backend: Arc<dyn GenerationBackend>,
    registry: Arc<ObserverRegistry>,
    polling: PollingDriver,
    streaming: StreamingDriver,
    cancellation: CancellationCoordinator,
    resolver: ReconnectResolver,
    sink: Arc<dyn ObserverSink>,
    event_tx: mpsc::Sender<EngineEvent>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl Orchestrator {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let backend = ReqwestBackend::new(settings.client)?;
        Self::with_backend(Arc::new(backend), settings.poll, settings.stream)
    }

    pub fn with_backend(
        backend: Arc<dyn GenerationBackend>,
        poll: PollSettings,
        stream: StreamSettings,
    ) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let (event_tx, event_rx) = mpsc::channel();
        let registry = Arc::new(ObserverRegistry::new());
        let polling = PollingDriver::new(backend.clone(), poll);
        let streaming = StreamingDriver::new(backend.clone(), stream);
        let cancellation = CancellationCoordinator::new(backend.clone(), registry.clone());
        let resolver = ReconnectResolver::new(
            backend.clone(),
            registry.clone(),
            polling.clone(),
            streaming.clone(),
        );
        let sink: Arc<dyn ObserverSink> = Arc::new(ChannelSink::new(event_tx.clone()));
        Ok(Self {
            runtime,
            backend,
            registry,
            polling,
            streaming,
            cancellation,
            resolver,
            sink,
            event_tx,
            event_rx,
        })
    }

    pub fn submit(&self, kind: JobKind, workspace_id: String, config: GenerationConfig) {
        let backend = self.backend.clone();
        let event_tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let event = match submit_job(backend.as_ref(), kind, &workspace_id, &config).await {
                Ok(job_id) => {
                    engine_info!("submitted {} {}", kind.label(), job_id);
                    EngineEvent::Submitted {
                        job_id,
                        kind,
                        config,
                    }
                }
                Err((job_id, error)) => {
                    engine_warn!("submitting {} failed: {}", kind.label(), error);
                    EngineEvent::SubmitFailed { job_id, error }
                }
            };
            let _ = event_tx.send(event);
        });
    }

    pub fn start_observer(&self, job_id: JobId, kind: JobKind, question_count: u32) {
        let _guard = self.runtime.enter();
        let handle = match kind {
            JobKind::Document => self.polling.start(job_id, self.sink.clone()),
            JobKind::TestQuestions => {
                self.streaming
                    .start(job_id, question_count, self.sink.clone())
            }
        };
        self.registry.insert(handle);
    }

    /// Tears down the local observer only; the remote job is left alone.
    pub fn stop_observer(&self, job_id: &JobId) -> bool {
        self.registry.remove(job_id).is_some()
    }

    pub fn cancel(&self, job_id: JobId) {
        let cancellation = self.cancellation.clone();
        let event_tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let outcome = cancellation.cancel(&job_id).await;
            let _ = event_tx.send(EngineEvent::CancelFinished { job_id, outcome });
        });
    }

    pub fn reconnect(&self, job_id: JobId, kind: JobKind) {
        let resolver = self.resolver.clone();
        let sink = self.sink.clone();
        let event_tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            match resolver.probe(&job_id, kind).await {
                Ok(RemoteState::Running(status)) => {
                    // The notice goes out after registration so a stop reply
                    // finds the observer, and before the driver's first event.
                    resolver.attach_announced(&job_id, kind, sink, |_| {
                        let _ = event_tx.send(EngineEvent::ReconnectAttached {
                            job_id: job_id.clone(),
                            status,
                        });
                    });
                }
                Ok(RemoteState::Finished(snapshot)) => {
                    let _ = event_tx.send(EngineEvent::ReconnectTerminal { job_id, snapshot });
                }
                Err(error) => {
                    engine_warn!("job {}: reconnect failed: {}", job_id, error);
                    let _ = event_tx.send(EngineEvent::ReconnectFailed { job_id, error });
                }
            }
        });
    }

    pub fn restart(&self, job_id: JobId, config: Option<GenerationConfig>) {
        let backend = self.backend.clone();
        let event_tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let event = match backend.restart_document(&job_id, config.as_ref()).await {
                Ok(()) => {
                    engine_info!("job {}: restarted", job_id);
                    EngineEvent::Restarted { job_id, config }
                }
                Err(error) => {
                    engine_warn!("job {}: restart failed: {}", job_id, error);
                    EngineEvent::SubmitFailed {
                        job_id: Some(job_id),
                        error,
                    }
                }
            };
            let _ = event_tx.send(event);
        });
    }

    pub fn answer(&self, job_id: &JobId, question_id: &str, answer: &str) -> Result<(), BackendError> {
        self.runtime
            .block_on(self.backend.submit_answer(job_id, question_id, answer))
    }

    pub fn complete_test(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.runtime.block_on(self.backend.complete_test(job_id))
    }

    pub fn active_observers(&self) -> usize {
        self.registry.len()
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        loop {
            let event = self.event_rx.try_recv().ok()?;
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let event = self.event_rx.recv_timeout(remaining).ok()?;
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
    }

    /// Drops events from observers that were stopped or replaced, and
    /// forgets observers once they report their own end.
    fn accept(&self, event: EngineEvent) -> Option<EngineEvent> {
        if let EngineEvent::Observer(observed) = &event {
            if !self.registry.is_live(&observed.job_id, observed.observer) {
                engine_trace!(
                    "job {}: dropping event from stale observer {}",
                    observed.job_id,
                    observed.observer
                );
                return None;
            }
            if observed.is_finished() {
                self.registry.retire(&observed.job_id, observed.observer);
            }
        }
        Some(event)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.registry.stop_all();
    }
}

async fn submit_job(
    backend: &dyn GenerationBackend,
    kind: JobKind,
    workspace_id: &str,
    config: &GenerationConfig,
) -> Result<JobId, (Option<JobId>, BackendError)> {
    match kind {
        JobKind::Document => {
            let job_id = backend
                .create_document(workspace_id, config)
                .await
                .map_err(|err| (None, err))?;
            backend
                .start_document(&job_id, config)
                .await
                .map_err(|err| (Some(job_id.clone()), err))?;
            Ok(job_id)
        }
        // The question stream itself starts generation.
        JobKind::TestQuestions => backend
            .create_test(workspace_id, config)
            .await
            .map_err(|err| (None, err)),
    }
}
