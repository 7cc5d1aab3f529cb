use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use genwatch_core::{GenerationConfig, JobId};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::sse::SseDecoder;
use crate::{BackendError, DocumentSnapshot, FailureKind, StreamEvent, TestSnapshot};

pub type EventStream = BoxStream<'static, Result<StreamEvent, BackendError>>;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to every request except the event stream, which is bounded by
    /// the streaming driver instead.
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// The generation backend as seen by the drivers.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn create_document(
        &self,
        workspace_id: &str,
        config: &GenerationConfig,
    ) -> Result<JobId, BackendError>;

    async fn start_document(
        &self,
        job_id: &JobId,
        config: &GenerationConfig,
    ) -> Result<(), BackendError>;

    async fn fetch_document(&self, job_id: &JobId) -> Result<DocumentSnapshot, BackendError>;

    async fn cancel_document(&self, job_id: &JobId) -> Result<(), BackendError>;

    /// Restarts a finished document, optionally with an edited config.
    async fn restart_document(
        &self,
        job_id: &JobId,
        config: Option<&GenerationConfig>,
    ) -> Result<(), BackendError>;

    async fn create_test(
        &self,
        workspace_id: &str,
        config: &GenerationConfig,
    ) -> Result<JobId, BackendError>;

    async fn open_test_stream(&self, job_id: &JobId) -> Result<EventStream, BackendError>;

    async fn fetch_test(&self, job_id: &JobId) -> Result<TestSnapshot, BackendError>;

    async fn submit_answer(
        &self,
        job_id: &JobId,
        question_id: &str,
        answer: &str,
    ) -> Result<(), BackendError>;

    async fn complete_test(&self, job_id: &JobId) -> Result<(), BackendError>;
}

#[derive(Deserialize)]
struct CreatedResource {
    id: JobId,
}

#[derive(Deserialize)]
struct DocumentEnvelope<T> {
    document: T,
}

#[derive(Deserialize)]
struct TestEnvelope<T> {
    test: T,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_instructions: Option<&'a str>,
    web_search: genwatch_core::WebSearchMode,
}

#[derive(Serialize)]
struct EditAndRestartRequest<'a> {
    config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct AnswerRequest<'a> {
    question_id: &'a str,
    answer: &'a str,
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: ClientSettings,
    base_url: Url,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: ClientSettings) -> Result<Self, BackendError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|err| BackendError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::new(
                FailureKind::InvalidUrl,
                format!("{} cannot carry a path", settings.base_url),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| BackendError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            base_url,
            settings,
            client,
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one so ids
    /// containing `/`, `?` or `#` stay a single segment.
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::new(FailureKind::InvalidUrl, "base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let response = self
            .client
            .get(self.url(segments)?)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = check_status(response)?
            .bytes()
            .await
            .map_err(map_reqwest_error)?;
        decode(&body)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<bytes::Bytes, BackendError> {
        let mut request = self
            .client
            .post(self.url(segments)?)
            .timeout(self.settings.request_timeout);
        if let Some(body) = body {
            let payload = serde_json::to_vec(body)
                .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))?;
            request = request.header(CONTENT_TYPE, "application/json").body(payload);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        check_status(response)?
            .bytes()
            .await
            .map_err(map_reqwest_error)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ReqwestBackend {
    async fn create_document(
        &self,
        workspace_id: &str,
        config: &GenerationConfig,
    ) -> Result<JobId, BackendError> {
        let body = self
            .post(&["workspaces", workspace_id, "documents"], Some(config))
            .await?;
        let created: DocumentEnvelope<CreatedResource> = decode(&body)?;
        Ok(created.document.id)
    }

    async fn start_document(
        &self,
        job_id: &JobId,
        config: &GenerationConfig,
    ) -> Result<(), BackendError> {
        let request = GenerateRequest {
            custom_instructions: config.custom_instructions.as_deref(),
            web_search: config.web_search,
        };
        self.post(&["documents", job_id.as_str(), "generate"], Some(&request))
            .await?;
        Ok(())
    }

    async fn fetch_document(&self, job_id: &JobId) -> Result<DocumentSnapshot, BackendError> {
        let envelope: DocumentEnvelope<DocumentSnapshot> =
            self.get_json(&["documents", job_id.as_str()]).await?;
        Ok(envelope.document)
    }

    async fn cancel_document(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.post::<()>(&["documents", job_id.as_str(), "cancel"], None)
            .await?;
        Ok(())
    }

    async fn restart_document(
        &self,
        job_id: &JobId,
        config: Option<&GenerationConfig>,
    ) -> Result<(), BackendError> {
        match config {
            Some(config) => {
                let request = EditAndRestartRequest { config };
                self.post(&["documents", job_id.as_str(), "edit-and-restart"], Some(&request))
                    .await?;
            }
            None => {
                self.post::<()>(&["documents", job_id.as_str(), "restart"], None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn create_test(
        &self,
        workspace_id: &str,
        config: &GenerationConfig,
    ) -> Result<JobId, BackendError> {
        let body = self
            .post(&["workspaces", workspace_id, "tests"], Some(config))
            .await?;
        let created: TestEnvelope<CreatedResource> = decode(&body)?;
        Ok(created.test.id)
    }

    async fn open_test_stream(&self, job_id: &JobId) -> Result<EventStream, BackendError> {
        let response = self
            .client
            .get(self.url(&["tests", job_id.as_str(), "generate"])?)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = check_status(response)?.bytes_stream();
        Ok(decode_event_stream(body))
    }

    async fn fetch_test(&self, job_id: &JobId) -> Result<TestSnapshot, BackendError> {
        let envelope: TestEnvelope<TestSnapshot> =
            self.get_json(&["tests", job_id.as_str()]).await?;
        Ok(envelope.test)
    }

    async fn submit_answer(
        &self,
        job_id: &JobId,
        question_id: &str,
        answer: &str,
    ) -> Result<(), BackendError> {
        let request = AnswerRequest {
            question_id,
            answer,
        };
        self.post(&["tests", job_id.as_str(), "answer"], Some(&request))
            .await?;
        Ok(())
    }

    async fn complete_test(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.post::<()>(&["tests", job_id.as_str(), "complete"], None)
            .await?;
        Ok(())
    }
}

/// Turns a raw SSE body into decoded question-stream events. A transport
/// error or an oversized event is yielded once and ends the stream.
fn decode_event_stream<S>(body: S) -> EventStream
where
    S: futures_util::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::new(), false);
    stream::unfold(
        state,
        |(mut body, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((event, (body, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => match decoder.push(&chunk) {
                        Ok(events) => {
                            pending.extend(events.iter().map(|data| StreamEvent::parse(data)));
                        }
                        Err(err) => {
                            done = true;
                            pending.push_back(Err(err));
                        }
                    },
                    Some(Err(err)) => {
                        done = true;
                        pending.push_back(Err(map_reqwest_error(err)));
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish().map(|data| StreamEvent::parse(&data)));
                    }
                }
            }
        },
    )
    .boxed()
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ));
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return BackendError::new(FailureKind::Decode, err.to_string());
    }
    BackendError::new(FailureKind::Network, err.to_string())
}
