//! # Permission Errors
//!
//! Error types for the ACL/CLP permission engine.

use thiserror::Error;

/// Result type for permission operations
pub type PermissionResult<T> = Result<T, PermissionError>;

/// Permission configuration and enforcement errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    // ==================
    // Configuration Errors
    // ==================
    /// Access pattern is not `*`, `authenticated`, `role:<name>` or `userField:<field>`
    #[error("Invalid access pattern: '{0}'")]
    InvalidAccessPattern(String),

    /// Permission subject string cannot be resolved
    #[error("Invalid permission subject: '{0}'")]
    InvalidSubject(String),

    /// Class-level permission document has the wrong shape
    #[error("Malformed class-level permissions: {0}")]
    Malformed(String),

    // ==================
    // Enforcement Errors
    // ==================
    /// Operation requires a signed-in identity
    #[error("Authentication required for '{0}'")]
    AuthenticationRequired(String),

    /// Identity is not granted the operation
    #[error("Permission denied for '{0}'")]
    Forbidden(String),
}

impl PermissionError {
    /// Raised while building configuration rather than while enforcing it
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PermissionError::InvalidAccessPattern(_)
                | PermissionError::InvalidSubject(_)
                | PermissionError::Malformed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(PermissionError::InvalidAccessPattern("x".into()).is_configuration_error());
        assert!(PermissionError::Malformed("x".into()).is_configuration_error());
        assert!(!PermissionError::Forbidden("find".into()).is_configuration_error());
        assert!(!PermissionError::AuthenticationRequired("get".into()).is_configuration_error());
    }

    #[test]
    fn test_messages_name_the_input() {
        let err = PermissionError::InvalidAccessPattern("owner:x".into());
        assert!(err.to_string().contains("owner:x"));
    }
}
