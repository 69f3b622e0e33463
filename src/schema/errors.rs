//! Schema catalog errors

use thiserror::Error;

use crate::acl::PermissionError;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building or loading a schema catalog
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Catalog file could not be read
    #[error("Failed to read schema catalog '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    /// Catalog JSON does not match the expected shape
    #[error("Malformed schema catalog: {0}")]
    Malformed(String),

    /// Same class registered twice
    #[error("Class '{0}' is registered more than once")]
    DuplicateClass(String),

    /// Class-level permissions of a class are invalid
    #[error("Invalid class-level permissions for '{class_name}': {source}")]
    InvalidPermissions {
        class_name: String,
        #[source]
        source: PermissionError,
    },
}
