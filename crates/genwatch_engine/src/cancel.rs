use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use genwatch_core::{JobId, JobKind};

use crate::{CancelOutcome, GenerationBackend, ObserverRegistry};

/// Stops local observation first, then asks the backend to cancel.
#[derive(Clone)]
pub struct CancellationCoordinator {
    backend: Arc<dyn GenerationBackend>,
    registry: Arc<ObserverRegistry>,
}

impl CancellationCoordinator {
    pub fn new(backend: Arc<dyn GenerationBackend>, registry: Arc<ObserverRegistry>) -> Self {
        Self { backend, registry }
    }

    pub async fn cancel(&self, job_id: &JobId) -> CancelOutcome {
        let Some(handle) = self.registry.remove(job_id) else {
            engine_debug!("job {}: cancel ignored, nothing is observing it", job_id);
            return CancelOutcome::AlreadyStopped;
        };
        let kind = handle.kind();
        drop(handle);

        match kind {
            JobKind::TestQuestions => {
                engine_info!("job {}: stopped question stream", job_id);
                CancelOutcome::LocalOnly
            }
            JobKind::Document => match self.backend.cancel_document(job_id).await {
                Ok(()) => {
                    engine_info!("job {}: cancel acknowledged", job_id);
                    CancelOutcome::Acknowledged
                }
                Err(err) => {
                    engine_warn!("job {}: remote cancel failed: {}", job_id, err);
                    CancelOutcome::RemoteFailed(err)
                }
            },
        }
    }
}
