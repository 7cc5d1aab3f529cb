#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use genwatch_core::{GenerationConfig, JobId, JobStatus, ObserverOutcome};
use genwatch_engine::{
    BackendError, DocumentSnapshot, EventStream, FailureKind, GenerationBackend, ObserverEvent,
    ObserverSink, ObserverUpdate, StreamEvent, TestSnapshot,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub fn document(status: JobStatus, log_len: usize) -> DocumentSnapshot {
    DocumentSnapshot {
        status,
        generation_log: (1..=log_len).map(|i| format!("step {i}")).collect(),
        content: None,
    }
}

pub fn question(n: usize) -> serde_json::Value {
    serde_json::json!({ "id": n, "prompt": format!("question {n}") })
}

pub fn network_error() -> BackendError {
    BackendError::new(FailureKind::Network, "connection refused")
}

/// Scripted in-memory backend. Document fetches pop from a queue and keep
/// returning the last successful snapshot once it runs dry.
#[derive(Default)]
pub struct FakeBackend {
    documents: Mutex<VecDeque<Result<DocumentSnapshot, BackendError>>>,
    last_document: Mutex<Option<DocumentSnapshot>>,
    fetch_delay: Mutex<Duration>,
    test: Mutex<Option<Result<TestSnapshot, BackendError>>>,
    stream_events: Mutex<Vec<Result<StreamEvent, BackendError>>>,
    stream_hangs: AtomicBool,
    cancel_fails: AtomicBool,
    pub document_fetches: AtomicUsize,
    pub test_fetches: AtomicUsize,
    pub cancels: AtomicUsize,
    pub restarts: AtomicUsize,
    pub created: AtomicUsize,
    pub started: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_document(&self, snapshot: Result<DocumentSnapshot, BackendError>) {
        self.documents.lock().unwrap().push_back(snapshot);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_test(&self, snapshot: Result<TestSnapshot, BackendError>) {
        *self.test.lock().unwrap() = Some(snapshot);
    }

    pub fn set_stream(&self, events: Vec<Result<StreamEvent, BackendError>>, hangs: bool) {
        *self.stream_events.lock().unwrap() = events;
        self.stream_hangs.store(hangs, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self) {
        self.cancel_fails.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for FakeBackend {
    async fn create_document(
        &self,
        _workspace_id: &str,
        _config: &GenerationConfig,
    ) -> Result<JobId, BackendError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobId::new(format!("doc-{n}")))
    }

    async fn start_document(
        &self,
        _job_id: &JobId,
        _config: &GenerationConfig,
    ) -> Result<(), BackendError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_document(&self, _job_id: &JobId) -> Result<DocumentSnapshot, BackendError> {
        self.document_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.documents.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last_document.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => self
                .last_document
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(network_error),
        }
    }

    async fn cancel_document(&self, _job_id: &JobId) -> Result<(), BackendError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if self.cancel_fails.load(Ordering::SeqCst) {
            return Err(network_error());
        }
        Ok(())
    }

    async fn restart_document(
        &self,
        _job_id: &JobId,
        _config: Option<&GenerationConfig>,
    ) -> Result<(), BackendError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_test(
        &self,
        _workspace_id: &str,
        _config: &GenerationConfig,
    ) -> Result<JobId, BackendError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobId::new(format!("test-{n}")))
    }

    async fn open_test_stream(&self, _job_id: &JobId) -> Result<EventStream, BackendError> {
        let events = std::mem::take(&mut *self.stream_events.lock().unwrap());
        let scripted = stream::iter(events);
        if self.stream_hangs.load(Ordering::SeqCst) {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    async fn fetch_test(&self, _job_id: &JobId) -> Result<TestSnapshot, BackendError> {
        self.test_fetches.fetch_add(1, Ordering::SeqCst);
        self.test
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(network_error()))
    }

    async fn submit_answer(
        &self,
        _job_id: &JobId,
        _question_id: &str,
        _answer: &str,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn complete_test(&self, _job_id: &JobId) -> Result<(), BackendError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<ObserverUpdate> {
        self.events().into_iter().map(|event| event.update).collect()
    }

    pub fn log_batches(&self) -> Vec<Vec<String>> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                ObserverUpdate::LogLines(lines) => Some(lines),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                ObserverUpdate::Progress(percent) => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<(ObserverOutcome, Option<Vec<serde_json::Value>>)> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                ObserverUpdate::Finished { outcome, items } => Some((outcome, items)),
                _ => None,
            })
            .collect()
    }
}

impl ObserverSink for RecordingSink {
    fn emit(&self, event: ObserverEvent) {
        self.events.lock().unwrap().push(event);
    }
}
