use std::time::Duration;

/// Failures of a user-triggered action. Every variant ends up as a visible
/// error message in the conversation; none is retried.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChatError {
    // Transport
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream idle for {0:?}")]
    IdleTimeout(Duration),

    // Payload
    #[error("response missing {0}")]
    EmptyResponse(&'static str),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("response has no readable body")]
    StreamUnavailable,

    // Operational
    #[error("cancelled")]
    Cancelled,
}

impl ChatError {
    /// Transport-level failures: the request never produced a usable response.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::Status { .. } | Self::IdleTimeout(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NetworkError(_) => "network_error",
            Self::Status { .. } => "http_status",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::EmptyResponse(_) => "empty_response",
            Self::InvalidResponse(_) => "invalid_response",
            Self::StreamUnavailable => "stream_unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Status { status, body }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}
