use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use genwatch_core::{JobId, JobKind, JobStatus, ObserverOutcome};
use tokio::sync::oneshot;

use crate::observer::{Emitter, ObserverHandle, ObserverSink};
use crate::{GenerationBackend, ObserverUpdate, StreamEvent};

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub short_timeout: Duration,
    pub long_timeout: Duration,
    /// Requests with more questions than this get the long timeout.
    pub long_threshold: u32,
}

impl StreamSettings {
    pub fn timeout_for(&self, question_count: u32) -> Duration {
        if question_count <= self.long_threshold {
            self.short_timeout
        } else {
            self.long_timeout
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            short_timeout: Duration::from_secs(60),
            long_timeout: Duration::from_secs(120),
            long_threshold: 10,
        }
    }
}

/// Push-based observer for test-question generation.
#[derive(Clone)]
pub struct StreamingDriver {
    backend: Arc<dyn GenerationBackend>,
    settings: StreamSettings,
}

impl StreamingDriver {
    pub fn new(backend: Arc<dyn GenerationBackend>, settings: StreamSettings) -> Self {
        Self { backend, settings }
    }

    /// Spawns the stream consumer on the current tokio runtime.
    pub fn start(
        &self,
        job_id: JobId,
        question_count: u32,
        sink: Arc<dyn ObserverSink>,
    ) -> ObserverHandle {
        self.spawn(job_id, question_count, sink, None)
    }

    pub(crate) fn spawn(
        &self,
        job_id: JobId,
        question_count: u32,
        sink: Arc<dyn ObserverSink>,
        gate: Option<oneshot::Receiver<()>>,
    ) -> ObserverHandle {
        let emitter = Emitter::new(job_id.clone(), sink);
        let observer = emitter.observer;
        let token = emitter.token.clone();
        let backend = self.backend.clone();
        let timeout = self.settings.timeout_for(question_count);
        engine_debug!(
            "job {}: starting stream observer {} ({}s cap)",
            job_id,
            observer,
            timeout.as_secs()
        );
        let task = tokio::spawn(async move {
            if !emitter.wait_for(gate).await {
                return;
            }
            consume(backend.as_ref(), question_count, timeout, &emitter).await;
        });
        ObserverHandle::new(observer, job_id, JobKind::TestQuestions, token, task)
    }

    pub fn stop(&self, handle: &ObserverHandle) {
        handle.stop();
    }
}

async fn consume(
    backend: &dyn GenerationBackend,
    question_count: u32,
    timeout: Duration,
    emitter: &Emitter,
) {
    let job_id = &emitter.job_id;
    let token = &emitter.token;
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut items: Vec<serde_json::Value> = Vec::new();

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        _ = &mut deadline => {
            engine_warn!("job {}: stream did not open within {}s", job_id, timeout.as_secs());
            finish(emitter, ObserverOutcome::TimedOut, items);
            return;
        }
        opened = backend.open_test_stream(job_id) => opened,
    };
    let mut events = match opened {
        Ok(events) => events,
        Err(err) => {
            engine_warn!("job {}: could not open question stream: {}", job_id, err);
            finish(emitter, ObserverOutcome::Degraded, items);
            return;
        }
    };
    emitter.emit(ObserverUpdate::Status(JobStatus::Generating));

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = &mut deadline => {
                engine_warn!(
                    "job {}: stream timed out after {}s with {} questions",
                    job_id,
                    timeout.as_secs(),
                    items.len()
                );
                finish(emitter, ObserverOutcome::TimedOut, items);
                return;
            }
            next = events.next() => next,
        };
        match next {
            Some(Ok(StreamEvent::Question { question })) => {
                emitter.emit(ObserverUpdate::Item {
                    index: items.len(),
                    item: question.clone(),
                });
                items.push(question);
                if let Some(percent) = stream_progress(items.len(), question_count) {
                    emitter.emit(ObserverUpdate::Progress(percent));
                }
            }
            Some(Ok(StreamEvent::Complete)) => break,
            Some(Ok(StreamEvent::Error { message })) => {
                engine_warn!(
                    "job {}: stream reported error: {}",
                    job_id,
                    message.as_deref().unwrap_or("unspecified")
                );
                finish(emitter, ObserverOutcome::Degraded, items);
                return;
            }
            Some(Err(err)) => {
                engine_warn!("job {}: stream failed: {}", job_id, err);
                finish(emitter, ObserverOutcome::Degraded, items);
                return;
            }
            None => {
                engine_warn!("job {}: stream ended without completion", job_id);
                finish(emitter, ObserverOutcome::Degraded, items);
                return;
            }
        }
    }
    drop(events);

    let canonical = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        canonical = backend.fetch_test(job_id) => canonical,
    };
    let items = match canonical {
        Ok(snapshot) if !snapshot.questions.is_empty() => snapshot.questions,
        Ok(_) => items,
        Err(err) => {
            engine_debug!("job {}: canonical fetch failed, keeping streamed questions: {}", job_id, err);
            items
        }
    };
    engine_info!("job {}: {} questions ready", job_id, items.len());
    finish(emitter, ObserverOutcome::Ready, items);
}

fn finish(emitter: &Emitter, outcome: ObserverOutcome, items: Vec<serde_json::Value>) {
    emitter.emit(ObserverUpdate::Finished {
        outcome,
        items: Some(items),
    });
}

/// Share of requested questions received so far, below completion.
fn stream_progress(received: usize, requested: u32) -> Option<u8> {
    if requested == 0 {
        return None;
    }
    let percent = (received as u64 * 100) / u64::from(requested);
    Some(percent.min(99) as u8)
}
