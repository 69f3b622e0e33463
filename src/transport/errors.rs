//! # Transport Errors
//!
//! Errors surfaced by a document store. The cursor propagates them
//! unchanged and leaves its state untouched.

use thiserror::Error;

/// Result type for store operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Network failure or store unreachable; safe to retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the request (non-success response)
    #[error("Request rejected by store: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Stable code for logs
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Unavailable(_) => "AEROQ_TRANSPORT_UNAVAILABLE",
            TransportError::Rejected(_) => "AEROQ_TRANSPORT_REJECTED",
        }
    }

    /// Whether a caller-driven retry can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            TransportError::Unavailable("x".into()).code(),
            "AEROQ_TRANSPORT_UNAVAILABLE"
        );
        assert_eq!(
            TransportError::Rejected("x".into()).code(),
            "AEROQ_TRANSPORT_REJECTED"
        );
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(TransportError::Unavailable("timeout".into()).is_transient());
        assert!(!TransportError::Rejected("bad stage".into()).is_transient());
    }
}
