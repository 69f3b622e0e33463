//! Mutable pagination state

use std::fmt;

use serde_json::Value;

/// Cursor lifecycle
///
/// ```text
/// FRESH ──next_page──▶ PAGING ──short page──▶ EXHAUSTED
///   ▲                                            │
///   └────────────────── reset ───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    /// No page fetched
    Fresh,
    /// At least one full page fetched
    Paging,
    /// A fetch returned fewer documents than the page size
    Exhausted,
}

impl CursorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorPhase::Fresh => "FRESH",
            CursorPhase::Paging => "PAGING",
            CursorPhase::Exhausted => "EXHAUSTED",
        }
    }
}

impl fmt::Display for CursorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position and counters of a cursor
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CursorState {
    /// Order field value of the last returned document; null when that
    /// document lacked the field
    pub position: Value,
    /// Identifier of the last returned document; None before the first
    /// non-empty page
    pub last_identifier: Option<String>,
    pub pages_fetched: u64,
    pub items_fetched: u64,
    pub exhausted: bool,
}

impl CursorState {
    pub fn phase(&self) -> CursorPhase {
        if self.exhausted {
            CursorPhase::Exhausted
        } else if self.pages_fetched > 0 {
            CursorPhase::Paging
        } else {
            CursorPhase::Fresh
        }
    }

    /// Whether later pages must start after a recorded document
    pub fn has_position(&self) -> bool {
        self.last_identifier.is_some()
    }
}
