use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use querydesk_core::api::{
    self, CompleteRequest, RunSqlRequest, TextToSqlRequest, TextToSqlResponse,
};
use querydesk_core::backend::{Backend, ByteStream};
use querydesk_core::errors::ChatError;
use querydesk_core::payload::QueryResult;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8340/api/cortex";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to unary calls only. Completion streams are bounded by the
    /// caller's idle timeout, both while waiting for headers and between
    /// chunks.
    pub request_timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// JSON-over-HTTP backend rooted at a configurable base URL.
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::NetworkError(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ChatError> {
        let mut req = self
            .client
            .post(self.url(path))
            .header("accept", "application/json")
            .json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ChatError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status, body));
        }
        Ok(resp)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ChatError> {
        let resp = self
            .send(path, body, Some(self.config.request_timeout))
            .await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChatError::NetworkError(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn identifiers(&self, path: &str) -> Result<Vec<String>, ChatError> {
        let body: Value = self.post_json(path, &serde_json::json!({})).await?;
        Ok(api::decode_identifiers(&body))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn analyst_details(&self) -> Result<Vec<String>, ChatError> {
        self.identifiers(api::ANALYST_DETAILS_PATH).await
    }

    #[instrument(skip(self))]
    async fn search_details(&self) -> Result<Vec<String>, ChatError> {
        self.identifiers(api::SEARCH_DETAILS_PATH).await
    }

    #[instrument(skip(self, request), fields(models = request.selected_models.len()))]
    async fn text_to_sql(&self, request: &TextToSqlRequest) -> Result<TextToSqlResponse, ChatError> {
        self.post_json(api::TEXT_TO_SQL_PATH, request).await
    }

    #[instrument(skip(self, request))]
    async fn run_sql(&self, request: &RunSqlRequest) -> Result<QueryResult, ChatError> {
        let body: Value = self.post_json(api::RUN_SQL_PATH, request).await?;
        QueryResult::decode(body)
    }

    #[instrument(skip(self, request))]
    async fn stream_complete(&self, request: &CompleteRequest) -> Result<ByteStream, ChatError> {
        let resp = self.send(api::STREAM_COMPLETE_PATH, request, None).await?;
        if resp.content_length() == Some(0) {
            debug!("completion response has an empty body");
            return Err(ChatError::StreamUnavailable);
        }
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::NetworkError(e.to_string())));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{ReadOutcome, TransportReader};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend_for(server: &MockServer) -> HttpBackend {
        HttpBackend::new(HttpBackendConfig::new(format!("{}/api/", server.uri()))).unwrap()
    }

    #[tokio::test]
    async fn text_to_sql_posts_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/text-to-sql"))
            .and(body_json(json!({
                "naturalLanguagePrompt": "count members",
                "selectedModels": ["members.yaml"],
                "selectedSearchServices": []
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responseText": "SELECT COUNT(*) FROM members",
                "responseKind": "sql",
                "promptEcho": "count members"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let resp = backend
            .text_to_sql(&TextToSqlRequest {
                natural_language_prompt: "count members".into(),
                selected_models: vec!["members.yaml".into()],
                selected_search_services: vec![],
            })
            .await
            .unwrap();
        assert_eq!(resp.response_kind.as_deref(), Some("sql"));
        assert_eq!(resp.response_text.as_deref(), Some("SELECT COUNT(*) FROM members"));
    }

    #[tokio::test]
    async fn run_sql_decodes_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/run-sql"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"plan": "HMO", "members": 12}]})),
            )
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let result = backend
            .run_sql(&RunSqlRequest {
                sql_text: "SELECT 1".into(),
                prompt_echo: "p".into(),
            })
            .await
            .unwrap();
        let table = result.as_table().unwrap();
        assert_eq!(table.columns, vec!["plan", "members"]);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/run-sql"))
            .respond_with(ResponseTemplate::new(500).set_body_string("warehouse down"))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .run_sql(&RunSqlRequest {
                sql_text: "SELECT 1".into(),
                prompt_echo: "p".into(),
            })
            .await
            .unwrap_err();
        match err {
            ChatError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "warehouse down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/text-to-sql"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .text_to_sql(&TextToSqlRequest {
                natural_language_prompt: "q".into(),
                selected_models: vec![],
                selected_search_services: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn catalog_lists_identifiers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyst-details"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["a.yaml", "b.yaml"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/search-details"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        assert_eq!(backend.analyst_details().await.unwrap(), vec!["a.yaml", "b.yaml"]);
        assert!(backend.search_details().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_complete_yields_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/stream-complete"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Enrollment grew.end_of_stream"))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let body = backend
            .stream_complete(&CompleteRequest {
                system_prompt: "summarize".into(),
                prior_result: json!([{"n": 1}]),
                prompt_echo: "p".into(),
            })
            .await
            .unwrap();

        let mut reader = TransportReader::new(Some(body)).unwrap();
        let mut text = String::new();
        while let ReadOutcome::Chunk(chunk) = reader.next_chunk().await.unwrap() {
            text.push_str(&chunk);
        }
        assert_eq!(text, "Enrollment grew.end_of_stream");
    }

    #[tokio::test]
    async fn empty_completion_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/stream-complete"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .stream_complete(&CompleteRequest {
                system_prompt: String::new(),
                prior_result: Value::Null,
                prompt_echo: String::new(),
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::StreamUnavailable));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let backend = HttpBackend::new(HttpBackendConfig::new("http://127.0.0.1:9")).unwrap();
        let err = backend.analyst_details().await.unwrap_err();
        assert!(err.is_network());
    }
}
