//! Error taxonomy.
//!
//! Three layers: registry errors (construction/dispatch time), client errors
//! (decision-service boundary, classified for the retry policy), and run
//! errors (everything the loop can surface to the host).

use thiserror::Error;

use crate::retry::Retryable;

/// Errors from the function registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("function `{0}` is already registered")]
    DuplicateName(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
}

/// Errors from the decision-service boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Token exchange failed. Fatal: nothing can proceed unauthorized.
    #[error("token exchange failed: {0}")]
    Auth(String),
    /// Non-2xx response. The retry policy classifies by status.
    #[error("decision service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The body did not match the expected shape. Fatal, never retried.
    #[error("malformed decision response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

impl Retryable for ClientError {
    /// HTTP 429 and 5xx are transient, as are transport failures. Auth and
    /// decode failures are fatal; other statuses (403 content problems
    /// included) are the caller's to resolve, not the backoff's.
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            ClientError::Transport(_) => true,
            ClientError::Auth(_) | ClientError::Decode(_) => false,
        }
    }
}

/// Errors surfaced by a worker or agent run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The decision service and the declared action space disagree.
    /// Never retried: the action space is fixed for the run.
    #[error("decision protocol disagreement: {0}")]
    Protocol(String),
    #[error("run cancelled")]
    Cancelled,
}
