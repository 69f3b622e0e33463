//! Observable events for aeroquery
//!
//! Events are explicit and typed. Each carries the severity it is logged
//! at by default.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Query configuration loaded from disk
    ConfigLoaded,
    /// Class schemas loaded from disk
    SchemasLoaded,
    /// A class-level permission configuration was rejected
    PermissionConfigRejected,

    // Compilation
    /// Query compiled successfully
    QueryCompiled,
    /// Query rejected at compile time
    QueryRejected,

    // Permissions
    /// Protected fields removed from a record
    FieldsFiltered,
    /// An operation was denied by class-level permissions
    OperationDenied,

    // Cursor
    /// Page fetched
    CursorPageFetched,
    /// Cursor reached the end of the result set
    CursorExhausted,
    /// Cursor returned to its fresh state
    CursorReset,
    /// Page fetch failed, cursor state untouched
    CursorFetchFailed,
    /// Cursor rebuilt from a serialized form
    CursorResumed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",
            Event::PermissionConfigRejected => "PERMISSION_CONFIG_REJECTED",

            Event::QueryCompiled => "QUERY_COMPILED",
            Event::QueryRejected => "QUERY_REJECTED",

            Event::FieldsFiltered => "FIELDS_FILTERED",
            Event::OperationDenied => "OPERATION_DENIED",

            Event::CursorPageFetched => "CURSOR_PAGE_FETCHED",
            Event::CursorExhausted => "CURSOR_EXHAUSTED",
            Event::CursorReset => "CURSOR_RESET",
            Event::CursorFetchFailed => "CURSOR_FETCH_FAILED",
            Event::CursorResumed => "CURSOR_RESUMED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryCompiled | Event::FieldsFiltered | Event::CursorPageFetched => {
                Severity::Trace
            }
            Event::QueryRejected
            | Event::PermissionConfigRejected
            | Event::OperationDenied => Severity::Warn,
            Event::CursorFetchFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::SchemasLoaded,
            Event::PermissionConfigRejected,
            Event::QueryCompiled,
            Event::QueryRejected,
            Event::FieldsFiltered,
            Event::OperationDenied,
            Event::CursorPageFetched,
            Event::CursorExhausted,
            Event::CursorReset,
            Event::CursorFetchFailed,
            Event::CursorResumed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_hot_path_events_are_trace() {
        assert_eq!(Event::QueryCompiled.severity(), Severity::Trace);
        assert_eq!(Event::FieldsFiltered.severity(), Severity::Trace);
        assert_eq!(Event::CursorFetchFailed.severity(), Severity::Error);
    }
}
