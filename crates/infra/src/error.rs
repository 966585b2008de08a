use thiserror::Error;

use voipbill_core::DomainError;

pub type InfraResult<T> = Result<T, InfraError>;

/// Failure of an external collaborator.
#[derive(Debug, Error)]
pub enum InfraError {
    /// Remote side unreachable (connect, timeout, TLS).
    #[error("transport failure: {0}")]
    Transport(String),

    /// Remote side answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Remote side refused the write (validation, lock, permissions).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("pdf rendering failed: {0}")]
    Pdf(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl InfraError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<reqwest::Error> for InfraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
