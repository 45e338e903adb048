use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use std::error::Error as StdError;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failures of the credentialed relay, each mapped to the HTTP status it answers with.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Upstream API key is not configured on the server.")]
    MissingCredential,

    #[error("Invalid chat request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("Upstream fetch failed: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Outcome of a chat turn that did not produce an assistant reply.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Nothing to send: input is empty")]
    EmptyInput,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Session '{0}' is still waiting for a reply")]
    Busy(String),

    #[error("Unknown session '{0}'")]
    UnknownSession(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unsupported session store type: {0}")]
    UnsupportedBackend(String),
}
