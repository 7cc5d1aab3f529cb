use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};

use engine_logging::engine_debug;
use genwatch_core::{JobId, JobKind};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{EngineEvent, ObserverEvent, ObserverId, ObserverUpdate};

pub trait ObserverSink: Send + Sync {
    fn emit(&self, event: ObserverEvent);
}

pub struct ChannelSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ObserverSink for ChannelSink {
    fn emit(&self, event: ObserverEvent) {
        let _ = self.tx.send(EngineEvent::Observer(event));
    }
}

/// A running driver task for one job. Dropping the handle stops the task.
#[derive(Debug)]
pub struct ObserverHandle {
    id: ObserverId,
    job_id: JobId,
    kind: JobKind,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    pub(crate) fn new(
        id: ObserverId,
        job_id: JobId,
        kind: JobKind,
        token: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            job_id,
            kind,
            token,
            task,
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }

    /// Waits for the driver task to exit without stopping it.
    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Per-attachment emitter handed to a driver task. Nothing is emitted once
/// the observer's token is cancelled.
pub(crate) struct Emitter {
    pub(crate) observer: ObserverId,
    pub(crate) job_id: JobId,
    pub(crate) token: CancellationToken,
    sink: Arc<dyn ObserverSink>,
}

impl Emitter {
    pub(crate) fn new(job_id: JobId, sink: Arc<dyn ObserverSink>) -> Self {
        Self {
            observer: ObserverId::next(),
            job_id,
            token: CancellationToken::new(),
            sink,
        }
    }

    /// Holds the driver until `gate` opens. A dropped sender opens it too.
    /// Returns false when the observer was stopped while waiting.
    pub(crate) async fn wait_for(&self, gate: Option<oneshot::Receiver<()>>) -> bool {
        let Some(gate) = gate else {
            return true;
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = gate => !self.token.is_cancelled(),
        }
    }

    pub(crate) fn emit(&self, update: ObserverUpdate) {
        if self.token.is_cancelled() {
            return;
        }
        self.sink.emit(ObserverEvent {
            observer: self.observer,
            job_id: self.job_id.clone(),
            update,
        });
    }
}

/// Live observers keyed by job id. At most one per job.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    handles: Mutex<HashMap<JobId, ObserverHandle>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle`, stopping whatever observed the same job before.
    pub fn insert(&self, handle: ObserverHandle) -> Option<ObserverId> {
        let replaced = self.lock().insert(handle.job_id().clone(), handle);
        replaced.map(|old| {
            engine_debug!("job {}: replacing observer {}", old.job_id(), old.id());
            old.stop();
            old.id()
        })
    }

    /// Removes and stops the observer for `job_id`.
    pub fn remove(&self, job_id: &JobId) -> Option<ObserverHandle> {
        let handle = self.lock().remove(job_id)?;
        handle.stop();
        Some(handle)
    }

    /// Drops the entry for a driver that finished on its own, provided it is
    /// still the registered one.
    pub fn retire(&self, job_id: &JobId, observer: ObserverId) -> bool {
        let mut handles = self.lock();
        if handles.get(job_id).map(ObserverHandle::id) != Some(observer) {
            return false;
        }
        handles.remove(job_id);
        true
    }

    /// Whether events from `observer` should still reach the projector.
    pub fn is_live(&self, job_id: &JobId, observer: ObserverId) -> bool {
        self.lock()
            .get(job_id)
            .is_some_and(|handle| handle.id() == observer && !handle.token.is_cancelled())
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stop_all(&self) {
        let drained: Vec<ObserverHandle> = self.lock().drain().map(|(_, handle)| handle).collect();
        for handle in &drained {
            handle.stop();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, ObserverHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ObserverRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
