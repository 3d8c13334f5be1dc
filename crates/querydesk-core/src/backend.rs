use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::api::{CompleteRequest, RunSqlRequest, TextToSqlRequest, TextToSqlResponse};
use crate::errors::ChatError;
use crate::payload::QueryResult;

/// Raw body of a streaming completion, as delivered by the transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// The remote service that does inference, SQL execution and search.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn analyst_details(&self) -> Result<Vec<String>, ChatError>;

    async fn search_details(&self) -> Result<Vec<String>, ChatError>;

    async fn text_to_sql(&self, request: &TextToSqlRequest) -> Result<TextToSqlResponse, ChatError>;

    async fn run_sql(&self, request: &RunSqlRequest) -> Result<QueryResult, ChatError>;

    /// Open a completion stream. The body ends with an in-band sentinel token
    /// rather than a structural end-of-stream signal.
    async fn stream_complete(&self, request: &CompleteRequest) -> Result<ByteStream, ChatError>;
}
