//! Error types and HTTP status mapping.
//!
//! Braid defines the common failure conditions of the aggregation layer and
//! maps them to HTTP status classes for the embedding handler. Backend and
//! partitioner failures are carried verbatim; the aggregator never rewrites
//! an embedder error into a different kind.

use thiserror::Error;

/// Common Braid error conditions.
#[derive(Debug, Error)]
pub enum BraidError {
    /// The client-supplied continue token failed to decode.
    ///
    /// Surfaced before any listing is attempted; a client error.
    #[error("malformed continue token: {reason}")]
    MalformedToken { reason: String },

    /// Partition resolution or store materialization failed.
    #[error("partitioner error: {message}")]
    Partitioner { message: String },

    /// A per-partition backend call failed mid-session.
    #[error("backend error in partition {partition}: {message}")]
    Backend { partition: String, message: String },

    /// The caller's cancellation token fired.
    ///
    /// Partial batches already delivered to the consumer remain valid.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid request parameters outside the token itself.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BraidError {
    /// Create a MalformedToken error.
    pub fn malformed_token(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }

    /// Create a Partitioner error.
    pub fn partitioner(message: impl Into<String>) -> Self {
        Self::Partitioner {
            message: message.into(),
        }
    }

    /// Create a Backend error for one partition.
    pub fn backend(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            partition: partition.into(),
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a pure cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is the client's fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken { .. } | Self::InvalidRequest { .. }
        )
    }
}

/// Result type using BraidError.
pub type BraidResult<T> = Result<T, BraidError>;

// ============================================================================
// HTTP status mapping
// ============================================================================

/// HTTP status mapping for the embedding handler.
pub struct HttpErrorMapping;

impl HttpErrorMapping {
    /// Map a BraidError to an HTTP status code.
    pub fn to_status_code(error: &BraidError) -> u16 {
        match error {
            BraidError::MalformedToken { .. } => 400,
            BraidError::InvalidRequest { .. } => 400,
            BraidError::Cancelled => 499,
            BraidError::Backend { .. } => 502,
            BraidError::Partitioner { .. } => 500,
            BraidError::Internal { .. } => 500,
        }
    }

    /// Get a response body message suitable for API clients.
    pub fn to_error_message(error: &BraidError) -> String {
        match error {
            BraidError::MalformedToken { .. } => {
                "the provided continue token is not valid".to_string()
            }
            BraidError::Cancelled => "the request was cancelled".to_string(),
            _ => error.to_string(),
        }
    }
}
