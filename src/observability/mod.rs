//! Observability subsystem for aeroquery
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on compilation, filtering or paging
//! 3. No background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use aeroquery::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::CursorPageFetched, &[("items", "100")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log an event at its default severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log an event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::CursorReset);
        log_event(Event::QueryCompiled);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::ConfigLoaded, &[("path", "/tmp/aeroquery.json")]);
    }
}
