//! Cursor Resume Tests
//!
//! Serialized cursors across process boundaries:
//! - A resumed cursor returns exactly the pages the original would have
//! - Tokens carry the same state as the JSON form
//! - Tampered, truncated or extended state is rejected
//! - Page size bounds hold at construction and on resume

use aeroquery::acl::RoleGraph;
use aeroquery::compiler::QueryCompiler;
use aeroquery::config::QueryConfig;
use aeroquery::cursor::{CursorErrorCode, CursorPhase, KeysetCursor, Severity};
use aeroquery::query::{Query, SortSpec};
use aeroquery::schema::{ClassSchema, SchemaCatalog};
use aeroquery::transport::MemoryStore;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new()
        .with_class(ClassSchema::new("Post"))
        .unwrap()
}

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_documents(
            "Post",
            (0..23).map(|i| {
                json!({
                    "objectId": format!("p{:02}", i),
                    "score": i % 4,
                    "status": if i % 5 == 0 { "draft" } else { "live" },
                })
            }),
        )
        .unwrap()
}

fn query() -> Query {
    Query::new("Post").where_eq("status", "live")
}

fn ids(page: Vec<Value>) -> Vec<String> {
    page.iter()
        .map(|d| d["objectId"].as_str().unwrap().to_string())
        .collect()
}

fn remaining(
    cursor: &mut KeysetCursor,
    compiler: &QueryCompiler<'_, SchemaCatalog>,
    store: &MemoryStore,
) -> Vec<Vec<String>> {
    cursor
        .pages(compiler, store)
        .map(|page| ids(page.unwrap()))
        .collect()
}

// =============================================================================
// Resume Tests
// =============================================================================

/// Resuming mid-pagination yields the original cursor's remaining pages.
#[test]
fn test_resume_reproduces_remaining_pages() {
    let config = QueryConfig::default();
    let catalog = catalog();
    let roles = RoleGraph::new();
    let compiler = QueryCompiler::new(&config, &catalog, &roles);
    let store = store();

    let mut original = KeysetCursor::new(query(), SortSpec::desc("score"), 4).unwrap();
    original.next_page(&compiler, &store).unwrap();
    original.next_page(&compiler, &store).unwrap();

    let saved = original.serialize().unwrap();
    let mut resumed = KeysetCursor::deserialize(&saved, &catalog).unwrap();
    assert_eq!(resumed.state(), original.state());
    assert_eq!(resumed.phase(), CursorPhase::Paging);

    let expected = remaining(&mut original, &compiler, &store);
    let actual = remaining(&mut resumed, &compiler, &store);
    assert!(!expected.is_empty());
    assert_eq!(actual, expected);
}

/// The token form resumes just like the JSON form.
#[test]
fn test_resume_from_token() {
    let config = QueryConfig::default();
    let catalog = catalog();
    let roles = RoleGraph::new();
    let compiler = QueryCompiler::new(&config, &catalog, &roles);
    let store = store();

    let mut original = KeysetCursor::new(query(), SortSpec::asc("score"), 3).unwrap();
    original.next_page(&compiler, &store).unwrap();

    let token = original.to_token().unwrap();
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    let mut resumed = KeysetCursor::from_token(&token, &catalog).unwrap();

    assert_eq!(
        remaining(&mut resumed, &compiler, &store),
        remaining(&mut original, &compiler, &store)
    );
}

/// Fresh and exhausted cursors round-trip their phase.
#[test]
fn test_resume_preserves_phase() {
    let config = QueryConfig::default();
    let catalog = catalog();
    let roles = RoleGraph::new();
    let compiler = QueryCompiler::new(&config, &catalog, &roles);
    let store = store();

    let fresh = KeysetCursor::new(query(), SortSpec::asc("score"), 50).unwrap();
    let resumed = KeysetCursor::deserialize(&fresh.serialize().unwrap(), &catalog).unwrap();
    assert_eq!(resumed.phase(), CursorPhase::Fresh);

    let mut done = KeysetCursor::new(query(), SortSpec::asc("score"), 50).unwrap();
    done.next_page(&compiler, &store).unwrap();
    assert_eq!(done.phase(), CursorPhase::Exhausted);

    let mut resumed = KeysetCursor::deserialize(&done.serialize().unwrap(), &catalog).unwrap();
    assert_eq!(resumed.phase(), CursorPhase::Exhausted);
    let fetches = store.fetch_count();
    assert!(resumed.next_page(&compiler, &store).unwrap().is_empty());
    assert_eq!(store.fetch_count(), fetches);
}

// =============================================================================
// Rejection Tests
// =============================================================================

/// Editing the query invalidates the checksum.
#[test]
fn test_tampered_query_rejected() {
    let cursor = KeysetCursor::new(query(), SortSpec::asc("score"), 10).unwrap();
    let mut saved = cursor.serialize().unwrap();
    saved["query"] = serde_json::to_value(Query::new("Post")).unwrap();

    let err = KeysetCursor::deserialize(&saved, &catalog()).unwrap_err();
    assert_eq!(err.code(), CursorErrorCode::AeroqCursorChecksumMismatch);
    assert_eq!(err.severity(), Severity::Reject);
}

/// Missing and unknown keys are rejected rather than defaulted.
#[test]
fn test_missing_and_unknown_keys_rejected() {
    let cursor = KeysetCursor::new(query(), SortSpec::asc("score"), 10).unwrap();
    let saved = cursor.serialize().unwrap();

    let mut missing = saved.clone();
    missing.as_object_mut().unwrap().remove("lastIdentifier");
    assert_eq!(
        KeysetCursor::deserialize(&missing, &catalog()).unwrap_err().code(),
        CursorErrorCode::AeroqCursorMissingField
    );

    let mut extended = saved;
    extended["cursorHint"] = json!(true);
    assert_eq!(
        KeysetCursor::deserialize(&extended, &catalog()).unwrap_err().code(),
        CursorErrorCode::AeroqCursorUnknownField
    );
}

/// A class dropped after serialization cannot be resumed.
#[test]
fn test_unregistered_class_rejected() {
    let cursor = KeysetCursor::new(query(), SortSpec::asc("score"), 10).unwrap();
    let saved = cursor.serialize().unwrap();

    let mut catalog = catalog();
    catalog.unregister("Post");
    assert_eq!(
        KeysetCursor::deserialize(&saved, &catalog).unwrap_err().code(),
        CursorErrorCode::AeroqCursorUnknownClass
    );
}

// =============================================================================
// Page Size Tests
// =============================================================================

/// 1001 is a configuration error; 0 becomes 1.
#[test]
fn test_page_size_limits() {
    let err = KeysetCursor::new(query(), SortSpec::asc("score"), 1001).unwrap_err();
    assert_eq!(err.code(), CursorErrorCode::AeroqCursorPageSizeExceeded);
    assert_eq!(err.severity(), Severity::Reject);

    let cursor = KeysetCursor::new(query(), SortSpec::asc("score"), 0).unwrap();
    assert_eq!(cursor.page_size(), 1);
}

/// A serialized page size above the maximum is rejected on resume.
#[test]
fn test_oversized_page_size_rejected_on_resume() {
    let cursor = KeysetCursor::new(query(), SortSpec::asc("score"), 10).unwrap();
    let mut saved = cursor.serialize().unwrap();
    saved["pageSize"] = json!(5000);

    assert_eq!(
        KeysetCursor::deserialize(&saved, &catalog()).unwrap_err().code(),
        CursorErrorCode::AeroqCursorPageSizeExceeded
    );
}
