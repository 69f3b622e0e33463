//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero status.

use std::fmt;
use std::io;

use crate::acl::PermissionError;
use crate::config::ConfigError;
use crate::query::QueryError;
use crate::schema::SchemaError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration, schema, role or permission file error
    ConfigError,
    /// I/O error (files, stdout)
    IoError,
    /// Query rejected by the compiler
    QueryRejected,
    /// Operation denied by class-level permissions
    PermissionDenied,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "AEROQ_CLI_CONFIG_ERROR",
            Self::IoError => "AEROQ_CLI_IO_ERROR",
            Self::QueryRejected => "AEROQ_CLI_QUERY_REJECTED",
            Self::PermissionDenied => "AEROQ_CLI_PERMISSION_DENIED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        Self::new(CliErrorCode::QueryRejected, e.to_string())
    }
}

impl From<PermissionError> for CliError {
    fn from(e: PermissionError) -> Self {
        if e.is_configuration_error() {
            Self::config_error(e.to_string())
        } else {
            Self::new(CliErrorCode::PermissionDenied, e.to_string())
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
