//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures of billing documents and their inputs.
///
/// Collaborator failures (HTTP, SMTP, PDF) live in the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A customer, product or document code could not be decoded.
    #[error("invalid code: {0}")]
    InvalidCode(String),

    /// A billing period is empty, inverted or out of range.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// A document lacks data it cannot be created without.
    #[error("incomplete document: {0}")]
    Incomplete(String),

    #[error("document is locked: {0}")]
    Locked(String),

    #[error("illegal state transition: {0}")]
    StateTransition(String),

    /// An order was grouped under a customer it does not belong to.
    #[error("order {order} does not belong to customer {customer}")]
    ForeignOrder { order: String, customer: String },
}

impl DomainError {
    pub fn invalid_code(msg: impl Into<String>) -> Self {
        Self::InvalidCode(msg.into())
    }

    pub fn invalid_period(msg: impl Into<String>) -> Self {
        Self::InvalidPeriod(msg.into())
    }

    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::Incomplete(msg.into())
    }
}
