//! Query layer configuration
//!
//! Names the wire fields the compiler and the permission engine target and
//! the cursor defaults. Every field has a default, so an empty JSON object
//! is a valid configuration.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};

/// Largest page a cursor may request
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Page size used when none is requested
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read configuration '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    /// File is not valid configuration JSON
    #[error("Malformed configuration: {0}")]
    Malformed(String),

    /// A value is out of its allowed range
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Query layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Unique document identifier (default: "objectId")
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,

    /// Stored read permission list (default: "_rperm")
    #[serde(default = "default_read_permission_field")]
    pub read_permission_field: String,

    /// Stored write permission list (default: "_wperm")
    #[serde(default = "default_write_permission_field")]
    pub write_permission_field: String,

    /// Entry granting access to everyone (default: "*")
    #[serde(default = "default_public_marker")]
    pub public_marker: String,

    /// Cursor page size when none is requested (default: 100)
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Fields guaranteed unique across a class, besides the identifier
    #[serde(default)]
    pub unique_fields: BTreeSet<String>,
}

fn default_identifier_field() -> String {
    "objectId".to_string()
}

fn default_read_permission_field() -> String {
    "_rperm".to_string()
}

fn default_write_permission_field() -> String {
    "_wperm".to_string()
}

fn default_public_marker() -> String {
    "*".to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            identifier_field: default_identifier_field(),
            read_permission_field: default_read_permission_field(),
            write_permission_field: default_write_permission_field(),
            public_marker: default_public_marker(),
            default_page_size: default_page_size(),
            unique_fields: BTreeSet::new(),
        }
    }
}

impl QueryConfig {
    /// Loads and validates a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_json_str(&content)?;
        log_event_with_fields(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
        Ok(config)
    }

    /// Parses and validates configuration JSON
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and field names
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_page_size == 0 || self.default_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size",
                reason: format!("must be within 1..={}", MAX_PAGE_SIZE),
            });
        }

        let names = [
            ("identifier_field", &self.identifier_field),
            ("read_permission_field", &self.read_permission_field),
            ("write_permission_field", &self.write_permission_field),
            ("public_marker", &self.public_marker),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if self.read_permission_field == self.write_permission_field {
            return Err(ConfigError::InvalidValue {
                field: "write_permission_field",
                reason: "must differ from read_permission_field".to_string(),
            });
        }

        Ok(())
    }

    /// Returns true if `field` holds a distinct value on every document
    pub fn is_unique_field(&self, field: &str) -> bool {
        field == self.identifier_field || self.unique_fields.contains(field)
    }
}
