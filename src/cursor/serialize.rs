//! Cursor serialization
//!
//! Serialized form (version 1):
//!
//! ```text
//! {
//!   "version": 1,
//!   "className": "Post",
//!   "query": { …Query… },
//!   "pageSize": 100,
//!   "orderField": "createdAt",
//!   "orderDirection": "asc",
//!   "position": <json>,
//!   "lastIdentifier": "abc" | null,
//!   "pagesFetched": 2,
//!   "itemsFetched": 200,
//!   "exhausted": false,
//!   "checksum": 3735928559
//! }
//! ```
//!
//! Reading is strict: every key is required, unknown keys are rejected,
//! the class must be registered and the checksum (CRC32 of the canonical
//! query definition) must match. Nothing is defaulted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Map, Value};

use super::cursor::KeysetCursor;
use super::errors::{CursorError, CursorResult};
use super::state::CursorState;
use crate::observability::{log_event_with_fields, Event};
use crate::query::{Query, SortDirection, SortSpec};
use crate::schema::ClassRegistry;

/// Current serialized format version
pub const CURSOR_FORMAT_VERSION: u64 = 1;

const REQUIRED_KEYS: [&str; 12] = [
    "version",
    "className",
    "query",
    "pageSize",
    "orderField",
    "orderDirection",
    "position",
    "lastIdentifier",
    "pagesFetched",
    "itemsFetched",
    "exhausted",
    "checksum",
];

/// CRC32 over the canonical JSON of the query and its ordering
fn checksum(query: &Query, order: &SortSpec) -> CursorResult<u32> {
    let canonical = serde_json::to_vec(&json!({
        "query": query,
        "orderField": order.field,
        "orderDirection": order.direction.as_str(),
    }))
    .map_err(|e| CursorError::malformed(format!("query is not serializable: {}", e)))?;
    Ok(crc32fast::hash(&canonical))
}

impl KeysetCursor {
    /// Query definition plus pagination state as one JSON value
    pub fn serialize(&self) -> CursorResult<Value> {
        let query = serde_json::to_value(&self.query)
            .map_err(|e| CursorError::malformed(format!("query is not serializable: {}", e)))?;
        Ok(json!({
            "version": CURSOR_FORMAT_VERSION,
            "className": self.query.class_name,
            "query": query,
            "pageSize": self.page_size,
            "orderField": self.order.field,
            "orderDirection": self.order.direction.as_str(),
            "position": self.state.position,
            "lastIdentifier": self.state.last_identifier,
            "pagesFetched": self.state.pages_fetched,
            "itemsFetched": self.state.items_fetched,
            "exhausted": self.state.exhausted,
            "checksum": checksum(&self.query, &self.order)?,
        }))
    }

    /// Rebuilds a cursor from `serialize` output
    pub fn deserialize<R: ClassRegistry + ?Sized>(value: &Value, registry: &R) -> CursorResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| CursorError::malformed("serialized cursor must be a JSON object"))?;
        for key in REQUIRED_KEYS {
            if !map.contains_key(key) {
                return Err(CursorError::missing_field(key));
            }
        }
        if let Some(extra) = map.keys().find(|k| !REQUIRED_KEYS.contains(&k.as_str())) {
            return Err(CursorError::unknown_field(extra));
        }

        let version = get_u64(map, "version")?;
        if version != CURSOR_FORMAT_VERSION {
            return Err(CursorError::unsupported_version(version, CURSOR_FORMAT_VERSION));
        }

        let class_name = get_str(map, "className")?;
        if !registry.class_exists(class_name) {
            return Err(CursorError::unknown_class(class_name));
        }

        let query: Query = serde_json::from_value(map["query"].clone())
            .map_err(|e| CursorError::malformed(format!("invalid query: {}", e)))?;
        if query.class_name != class_name {
            return Err(CursorError::malformed(format!(
                "className '{}' does not match query class '{}'",
                class_name, query.class_name
            )));
        }

        let direction = match get_str(map, "orderDirection")? {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => {
                return Err(CursorError::malformed(format!(
                    "orderDirection must be 'asc' or 'desc', got '{}'",
                    other
                )))
            }
        };
        let order = SortSpec {
            field: get_str(map, "orderField")?.to_string(),
            direction,
        };

        let recorded = get_u64(map, "checksum")?;
        let computed = checksum(&query, &order)?;
        if recorded != u64::from(computed) {
            return Err(CursorError::checksum_mismatch(recorded as u32, computed));
        }

        let page_size = map["pageSize"]
            .as_i64()
            .ok_or_else(|| CursorError::malformed("pageSize must be an integer"))?;
        let last_identifier = match &map["lastIdentifier"] {
            Value::Null => None,
            Value::String(id) => Some(id.clone()),
            _ => return Err(CursorError::malformed("lastIdentifier must be a string or null")),
        };
        let state = CursorState {
            position: map["position"].clone(),
            last_identifier,
            pages_fetched: get_u64(map, "pagesFetched")?,
            items_fetched: get_u64(map, "itemsFetched")?,
            exhausted: map["exhausted"]
                .as_bool()
                .ok_or_else(|| CursorError::malformed("exhausted must be a boolean"))?,
        };

        let mut cursor = KeysetCursor::new(query, order, page_size)?;
        cursor.state = state;

        let pages = cursor.state.pages_fetched.to_string();
        log_event_with_fields(
            Event::CursorResumed,
            &[("class", class_name), ("pages_fetched", &pages)],
        );
        Ok(cursor)
    }

    /// Serialized form as an opaque URL-safe token
    pub fn to_token(&self) -> CursorResult<String> {
        let bytes = serde_json::to_vec(&self.serialize()?)
            .map_err(|e| CursorError::malformed(format!("cursor is not serializable: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Rebuilds a cursor from `to_token` output
    pub fn from_token<R: ClassRegistry + ?Sized>(token: &str, registry: &R) -> CursorResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CursorError::malformed(format!("invalid cursor token: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| CursorError::malformed(format!("invalid cursor token: {}", e)))?;
        Self::deserialize(&value, registry)
    }
}

fn get_u64(map: &Map<String, Value>, key: &str) -> CursorResult<u64> {
    map[key]
        .as_u64()
        .ok_or_else(|| CursorError::malformed(format!("{} must be a non-negative integer", key)))
}

fn get_str<'v>(map: &'v Map<String, Value>, key: &str) -> CursorResult<&'v str> {
    map[key]
        .as_str()
        .ok_or_else(|| CursorError::malformed(format!("{} must be a string", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorErrorCode;
    use crate::schema::{ClassSchema, SchemaCatalog};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new().with_class(ClassSchema::new("Post")).unwrap()
    }

    fn paged_cursor() -> KeysetCursor {
        let mut cursor = KeysetCursor::new(
            Query::new("Post").where_eq("status", "open"),
            SortSpec::desc("createdAt"),
            25,
        )
        .unwrap();
        cursor.state = CursorState {
            position: json!({"__type": "Date", "iso": "2024-01-01T00:00:00Z"}),
            last_identifier: Some("p9".into()),
            pages_fetched: 2,
            items_fetched: 50,
            exhausted: false,
        };
        cursor
    }

    #[test]
    fn test_serialize_round_trip() {
        let cursor = paged_cursor();
        let value = cursor.serialize().unwrap();
        assert_eq!(value["version"], json!(1));
        assert_eq!(value["orderDirection"], json!("desc"));

        let restored = KeysetCursor::deserialize(&value, &catalog()).unwrap();
        assert_eq!(restored, cursor);
    }

    #[test]
    fn test_token_round_trip() {
        let cursor = paged_cursor();
        let token = cursor.to_token().unwrap();
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
        assert_eq!(KeysetCursor::from_token(&token, &catalog()).unwrap(), cursor);
    }

    #[test]
    fn test_missing_key_rejected() {
        let mut value = paged_cursor().serialize().unwrap();
        value.as_object_mut().unwrap().remove("lastIdentifier");
        let err = KeysetCursor::deserialize(&value, &catalog()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorMissingField);
        assert!(err.message().contains("lastIdentifier"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut value = paged_cursor().serialize().unwrap();
        value["extra"] = json!(true);
        let err = KeysetCursor::deserialize(&value, &catalog()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorUnknownField);
    }

    #[test]
    fn test_unregistered_class_rejected() {
        let value = paged_cursor().serialize().unwrap();
        let err = KeysetCursor::deserialize(&value, &SchemaCatalog::new()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorUnknownClass);
    }

    #[test]
    fn test_tampered_query_rejected() {
        let mut value = paged_cursor().serialize().unwrap();
        value["orderField"] = json!("updatedAt");
        let err = KeysetCursor::deserialize(&value, &catalog()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorChecksumMismatch);
    }

    #[test]
    fn test_version_checked() {
        let mut value = paged_cursor().serialize().unwrap();
        value["version"] = json!(2);
        let err = KeysetCursor::deserialize(&value, &catalog()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorUnsupportedVersion);
    }

    #[test]
    fn test_oversized_page_rejected_on_resume() {
        let mut value = paged_cursor().serialize().unwrap();
        value["pageSize"] = json!(5000);
        let err = KeysetCursor::deserialize(&value, &catalog()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorPageSizeExceeded);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let err = KeysetCursor::from_token("not a token!", &catalog()).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorMalformed);
    }
}
