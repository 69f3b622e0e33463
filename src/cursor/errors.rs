//! Cursor error types
//!
//! Error codes:
//! - AEROQ_CURSOR_PAGE_SIZE_EXCEEDED (REJECT)
//! - AEROQ_CURSOR_NOT_PAGEABLE (REJECT)
//! - AEROQ_CURSOR_MISSING_FIELD (REJECT)
//! - AEROQ_CURSOR_UNKNOWN_FIELD (REJECT)
//! - AEROQ_CURSOR_UNKNOWN_CLASS (REJECT)
//! - AEROQ_CURSOR_UNSUPPORTED_VERSION (REJECT)
//! - AEROQ_CURSOR_CHECKSUM_MISMATCH (REJECT)
//! - AEROQ_CURSOR_MALFORMED (REJECT)
//! - AEROQ_CURSOR_MISSING_IDENTIFIER (ERROR)
//! - AEROQ_CURSOR_QUERY (REJECT)
//! - AEROQ_CURSOR_TRANSPORT (ERROR)
//!
//! A failed call never changes cursor state. Transport errors are carried
//! unchanged so callers can inspect and retry.

use std::fmt;

use crate::query::QueryError;
use crate::transport::TransportError;

/// Severity levels for cursor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller input rejected; retrying will not help
    Reject,
    /// Fetch failed; the same call may be retried
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Cursor error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorErrorCode {
    /// Requested page size above the maximum
    AeroqCursorPageSizeExceeded,
    /// Query cannot be paged by key (grouped)
    AeroqCursorNotPageable,
    /// Serialized cursor lacks a required key
    AeroqCursorMissingField,
    /// Serialized cursor carries an unexpected key
    AeroqCursorUnknownField,
    /// Serialized cursor names a class that is not registered
    AeroqCursorUnknownClass,
    /// Serialized cursor written by an incompatible version
    AeroqCursorUnsupportedVersion,
    /// Query definition does not match its checksum
    AeroqCursorChecksumMismatch,
    /// Serialized cursor or token cannot be decoded
    AeroqCursorMalformed,
    /// A fetched document has no identifier to resume from
    AeroqCursorMissingIdentifier,
    /// Derived page query failed to compile
    AeroqCursorQuery,
    /// Store fetch failed
    AeroqCursorTransport,
}

impl CursorErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            CursorErrorCode::AeroqCursorPageSizeExceeded => "AEROQ_CURSOR_PAGE_SIZE_EXCEEDED",
            CursorErrorCode::AeroqCursorNotPageable => "AEROQ_CURSOR_NOT_PAGEABLE",
            CursorErrorCode::AeroqCursorMissingField => "AEROQ_CURSOR_MISSING_FIELD",
            CursorErrorCode::AeroqCursorUnknownField => "AEROQ_CURSOR_UNKNOWN_FIELD",
            CursorErrorCode::AeroqCursorUnknownClass => "AEROQ_CURSOR_UNKNOWN_CLASS",
            CursorErrorCode::AeroqCursorUnsupportedVersion => "AEROQ_CURSOR_UNSUPPORTED_VERSION",
            CursorErrorCode::AeroqCursorChecksumMismatch => "AEROQ_CURSOR_CHECKSUM_MISMATCH",
            CursorErrorCode::AeroqCursorMalformed => "AEROQ_CURSOR_MALFORMED",
            CursorErrorCode::AeroqCursorMissingIdentifier => "AEROQ_CURSOR_MISSING_IDENTIFIER",
            CursorErrorCode::AeroqCursorQuery => "AEROQ_CURSOR_QUERY",
            CursorErrorCode::AeroqCursorTransport => "AEROQ_CURSOR_TRANSPORT",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            CursorErrorCode::AeroqCursorMissingIdentifier | CursorErrorCode::AeroqCursorTransport => {
                Severity::Error
            }
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for CursorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Underlying failure, kept intact for callers that branch on it
#[derive(Debug, Clone, PartialEq)]
pub enum CursorCause {
    Query(QueryError),
    Transport(TransportError),
}

/// Cursor error with full context
#[derive(Debug, Clone, PartialEq)]
pub struct CursorError {
    code: CursorErrorCode,
    message: String,
    cause: Option<CursorCause>,
}

impl CursorError {
    fn new(code: CursorErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            cause: None,
        }
    }

    pub fn page_size_exceeded(requested: i64, max: u32) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorPageSizeExceeded,
            format!("Page size {} exceeds the maximum of {}", requested, max),
        )
    }

    pub fn not_pageable(class_name: &str, reason: &str) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorNotPageable,
            format!("Query on '{}' cannot be paged: {}", class_name, reason),
        )
    }

    pub fn missing_field(key: &str) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorMissingField,
            format!("Serialized cursor is missing required key '{}'", key),
        )
    }

    pub fn unknown_field(key: &str) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorUnknownField,
            format!("Serialized cursor has unexpected key '{}'", key),
        )
    }

    pub fn unknown_class(class_name: &str) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorUnknownClass,
            format!("Class '{}' is not registered", class_name),
        )
    }

    pub fn unsupported_version(found: u64, expected: u64) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorUnsupportedVersion,
            format!(
                "Serialized cursor version {} is not supported (expected {})",
                found, expected
            ),
        )
    }

    pub fn checksum_mismatch(expected: u32, actual: u32) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorChecksumMismatch,
            format!(
                "Query checksum mismatch: recorded {:08x}, computed {:08x}",
                expected, actual
            ),
        )
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(CursorErrorCode::AeroqCursorMalformed, reason.into())
    }

    pub fn missing_identifier(class_name: &str, identifier_field: &str) -> Self {
        Self::new(
            CursorErrorCode::AeroqCursorMissingIdentifier,
            format!(
                "Document of '{}' returned without '{}'; cannot record position",
                class_name, identifier_field
            ),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> CursorErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying query or transport error, if any
    pub fn cause(&self) -> Option<&CursorCause> {
        self.cause.as_ref()
    }

    /// The store error this failure carries, if any
    pub fn transport_error(&self) -> Option<&TransportError> {
        match &self.cause {
            Some(CursorCause::Transport(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<QueryError> for CursorError {
    fn from(err: QueryError) -> Self {
        Self {
            code: CursorErrorCode::AeroqCursorQuery,
            message: err.to_string(),
            cause: Some(CursorCause::Query(err)),
        }
    }
}

impl From<TransportError> for CursorError {
    fn from(err: TransportError) -> Self {
        Self {
            code: CursorErrorCode::AeroqCursorTransport,
            message: err.to_string(),
            cause: Some(CursorCause::Transport(err)),
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(CursorCause::Query(e)) => Some(e),
            Some(CursorCause::Transport(e)) => Some(e),
            None => None,
        }
    }
}

/// Result type for cursor operations
pub type CursorResult<T> = Result<T, CursorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CursorErrorCode::AeroqCursorPageSizeExceeded.code(),
            "AEROQ_CURSOR_PAGE_SIZE_EXCEEDED"
        );
        assert_eq!(
            CursorErrorCode::AeroqCursorChecksumMismatch.code(),
            "AEROQ_CURSOR_CHECKSUM_MISMATCH"
        );
    }

    #[test]
    fn test_transport_error_carried_unchanged() {
        let original = TransportError::Unavailable("connection reset".into());
        let err = CursorError::from(original.clone());
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorTransport);
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.transport_error(), Some(&original));
    }

    #[test]
    fn test_display_format() {
        let err = CursorError::page_size_exceeded(1001, 1000);
        let display = format!("{}", err);
        assert!(display.starts_with("[REJECT] AEROQ_CURSOR_PAGE_SIZE_EXCEEDED"));
        assert!(display.contains("1001"));
    }
}
