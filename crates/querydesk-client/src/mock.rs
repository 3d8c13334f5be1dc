use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;

use querydesk_core::api::{CompleteRequest, RunSqlRequest, TextToSqlRequest, TextToSqlResponse};
use querydesk_core::backend::{Backend, ByteStream};
use querydesk_core::errors::ChatError;
use querydesk_core::payload::QueryResult;

/// One step of a scripted completion body.
#[derive(Clone, Debug)]
pub enum MockChunk {
    Bytes(Bytes),
    /// Sleep before the next step.
    Delay(Duration),
    Error(ChatError),
    /// Never yield again.
    Pending,
}

impl MockChunk {
    pub fn text(text: &str) -> Self {
        Self::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// Scripted reply to `stream_complete`.
#[derive(Clone, Debug)]
pub enum MockStream {
    Chunks(Vec<MockChunk>),
    /// The response arrives but has no readable body.
    NoBody,
    /// The response headers never arrive.
    Stalled,
    Fail(ChatError),
}

impl MockStream {
    /// Each string becomes one chunk.
    pub fn texts(parts: &[&str]) -> Self {
        Self::Chunks(parts.iter().map(|p| MockChunk::text(p)).collect())
    }
}

#[derive(Default)]
struct Script {
    text_to_sql: VecDeque<Result<TextToSqlResponse, ChatError>>,
    run_sql: VecDeque<Result<QueryResult, ChatError>>,
    completions: VecDeque<MockStream>,
    models: Vec<String>,
    search_services: Vec<String>,
}

/// Requests seen by a [`MockBackend`], in call order per endpoint.
#[derive(Clone, Debug, Default)]
pub struct Recorded {
    pub text_to_sql: Vec<TextToSqlRequest>,
    pub run_sql: Vec<RunSqlRequest>,
    pub completions: Vec<CompleteRequest>,
}

/// Backend that replays scripted replies, one per call, in order.
/// A call with nothing scripted fails with `InvalidResponse`.
#[derive(Default)]
pub struct MockBackend {
    script: Mutex<Script>,
    recorded: Mutex<Recorded>,
    latency: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every unary reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_catalog(self, models: &[&str], search_services: &[&str]) -> Self {
        {
            let mut script = self.script.lock();
            script.models = models.iter().map(|s| s.to_string()).collect();
            script.search_services = search_services.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn push_text_to_sql(&self, reply: Result<TextToSqlResponse, ChatError>) {
        self.script.lock().text_to_sql.push_back(reply);
    }

    /// Script a well-formed answer of the given kind.
    pub fn push_answer(&self, kind: &str, text: &str, prompt_echo: &str) {
        self.push_text_to_sql(Ok(TextToSqlResponse {
            response_text: Some(text.to_string()),
            response_kind: Some(kind.to_string()),
            prompt_echo: Some(prompt_echo.to_string()),
        }));
    }

    pub fn push_run_sql(&self, reply: Result<QueryResult, ChatError>) {
        self.script.lock().run_sql.push_back(reply);
    }

    /// Script a `/run-sql` reply from a raw response body.
    pub fn push_run_sql_body(&self, body: serde_json::Value) {
        self.push_run_sql(QueryResult::decode(body));
    }

    pub fn push_completion(&self, reply: MockStream) {
        self.script.lock().completions.push_back(reply);
    }

    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn unscripted(endpoint: &str) -> ChatError {
        ChatError::InvalidResponse(format!("MockBackend: no reply scripted for {endpoint}"))
    }
}

fn chunk_stream(chunks: Vec<MockChunk>) -> ByteStream {
    Box::pin(stream::unfold(
        VecDeque::from(chunks),
        |mut rest| async move {
            loop {
                match rest.pop_front()? {
                    MockChunk::Bytes(bytes) => return Some((Ok(bytes), rest)),
                    MockChunk::Error(e) => return Some((Err(e), rest)),
                    MockChunk::Delay(d) => tokio::time::sleep(d).await,
                    MockChunk::Pending => futures::future::pending::<()>().await,
                }
            }
        },
    ))
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyst_details(&self) -> Result<Vec<String>, ChatError> {
        self.pause().await;
        Ok(self.script.lock().models.clone())
    }

    async fn search_details(&self) -> Result<Vec<String>, ChatError> {
        self.pause().await;
        Ok(self.script.lock().search_services.clone())
    }

    async fn text_to_sql(&self, request: &TextToSqlRequest) -> Result<TextToSqlResponse, ChatError> {
        self.recorded.lock().text_to_sql.push(request.clone());
        self.pause().await;
        let reply = self.script.lock().text_to_sql.pop_front();
        reply.unwrap_or_else(|| Err(Self::unscripted("text-to-sql")))
    }

    async fn run_sql(&self, request: &RunSqlRequest) -> Result<QueryResult, ChatError> {
        self.recorded.lock().run_sql.push(request.clone());
        self.pause().await;
        let reply = self.script.lock().run_sql.pop_front();
        reply.unwrap_or_else(|| Err(Self::unscripted("run-sql")))
    }

    async fn stream_complete(&self, request: &CompleteRequest) -> Result<ByteStream, ChatError> {
        self.recorded.lock().completions.push(request.clone());
        self.pause().await;
        let reply = self.script.lock().completions.pop_front();
        match reply {
            Some(MockStream::Chunks(chunks)) => Ok(chunk_stream(chunks)),
            Some(MockStream::NoBody) => Err(ChatError::StreamUnavailable),
            Some(MockStream::Stalled) => futures::future::pending().await,
            Some(MockStream::Fail(e)) => Err(e),
            None => Err(Self::unscripted("stream-complete")),
        }
    }
}
