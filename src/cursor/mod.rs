//! Keyset cursor
//!
//! Gap-free, duplicate-free pagination over stores without native
//! cursors. Position is the (order value, identifier) pair of the last
//! document returned; pages are bounded, ordered and resumable across
//! processes through a strict serialized form.
//!
//! A cursor is single-owner: `next_page` takes `&mut self`. Independent
//! cursors over the same query do not interact.

mod cursor;
mod errors;
mod iter;
mod serialize;
mod state;

pub use cursor::KeysetCursor;
pub use errors::{CursorCause, CursorError, CursorErrorCode, CursorResult, Severity};
pub use iter::{Documents, Pages};
pub use serialize::CURSOR_FORMAT_VERSION;
pub use state::{CursorPhase, CursorState};
