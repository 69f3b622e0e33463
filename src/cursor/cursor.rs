//! Keyset cursor
//!
//! Pages through a query by remembering the order value and identifier of
//! the last document returned, never by offset. Each page query adds
//!
//! ```text
//! (order beyond position) OR (order == position AND id beyond last_id)
//! ```
//!
//! so documents sharing an order value are neither skipped nor repeated.
//! State changes only after a fetch succeeds.

use serde_json::Value;

use super::errors::{CursorError, CursorResult};
use super::state::{CursorPhase, CursorState};
use crate::compiler::QueryCompiler;
use crate::config::{QueryConfig, MAX_PAGE_SIZE};
use crate::observability::{log_event_with_fields, Event};
use crate::query::{ConstraintValue, Query, SortDirection, SortSpec};
use crate::schema::ClassRegistry;
use crate::transport::{get_path, DocumentStore};

/// Resumable keyset cursor over one query
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetCursor {
    pub(super) query: Query,
    pub(super) order: SortSpec,
    pub(super) page_size: u32,
    pub(super) state: CursorState,
}

impl KeysetCursor {
    /// Creates a cursor ordered by `order`.
    ///
    /// Page sizes above the maximum are rejected; sizes below 1 become 1.
    /// The query's own skip, limit and order are replaced per page.
    pub fn new(query: Query, order: SortSpec, page_size: i64) -> CursorResult<Self> {
        if query.group_by.is_some() {
            return Err(CursorError::not_pageable(
                &query.class_name,
                "grouped results have no stable document key",
            ));
        }
        Ok(Self {
            query,
            order,
            page_size: clamp_page_size(page_size)?,
            state: CursorState::default(),
        })
    }

    /// Creates a cursor using the configured default page size
    pub fn with_config(query: Query, order: SortSpec, config: &QueryConfig) -> CursorResult<Self> {
        Self::new(query, order, i64::from(config.default_page_size))
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn order(&self) -> &SortSpec {
        &self.order
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn phase(&self) -> CursorPhase {
        self.state.phase()
    }

    /// Fetches the next page. Returns an empty page once exhausted,
    /// without contacting the store.
    pub fn next_page<R, S>(
        &mut self,
        compiler: &QueryCompiler<'_, R>,
        store: &S,
    ) -> CursorResult<Vec<Value>>
    where
        R: ClassRegistry,
        S: DocumentStore + ?Sized,
    {
        if self.state.exhausted {
            return Ok(Vec::new());
        }

        let identifier = compiler.config().identifier_field.as_str();
        let compiled = compiler.compile_for_pagination(&self.page_query(identifier))?;
        let page = match store.fetch(&compiled) {
            Ok(page) => page,
            Err(err) => {
                log_event_with_fields(
                    Event::CursorFetchFailed,
                    &[("class", &self.query.class_name), ("code", err.code())],
                );
                return Err(err.into());
            }
        };

        // Read the new position before touching state
        let next_position = match page.last() {
            Some(doc) => {
                let id = doc
                    .get(identifier)
                    .and_then(Value::as_str)
                    .ok_or_else(|| CursorError::missing_identifier(&self.query.class_name, identifier))?;
                let position = get_path(doc, &self.order.field).cloned().unwrap_or(Value::Null);
                Some((position, id.to_string()))
            }
            None => None,
        };

        self.state.pages_fetched += 1;
        self.state.items_fetched += page.len() as u64;
        if let Some((position, id)) = next_position {
            self.state.position = position;
            self.state.last_identifier = Some(id);
        }

        let pages = self.state.pages_fetched.to_string();
        let items = page.len().to_string();
        log_event_with_fields(
            Event::CursorPageFetched,
            &[
                ("class", &self.query.class_name),
                ("page", &pages),
                ("items", &items),
            ],
        );

        if page.len() < self.page_size as usize {
            self.state.exhausted = true;
            let total = self.state.items_fetched.to_string();
            log_event_with_fields(
                Event::CursorExhausted,
                &[("class", &self.query.class_name), ("items_fetched", &total)],
            );
        }
        Ok(page)
    }

    /// Returns to the fresh state; the next fetch starts from the top
    pub fn reset(&mut self) {
        self.state = CursorState::default();
        log_event_with_fields(Event::CursorReset, &[("class", &self.query.class_name)]);
    }

    /// Query for the next page: base clauses plus the keyset bound,
    /// ordered by (order field, identifier) and limited to one page
    pub(crate) fn page_query(&self, identifier: &str) -> Query {
        let mut query = self.query.clone();
        query.skip = None;
        query.limit = Some(u64::from(self.page_size));
        query.order = vec![self.order.clone()];
        if self.order.field != identifier {
            query.order.push(SortSpec {
                field: identifier.to_string(),
                direction: self.order.direction,
            });
        }
        if let Some(keys) = query.keys.as_mut() {
            if !keys.contains(&self.order.field) {
                keys.push(self.order.field.clone());
            }
        }

        if !self.state.has_position() {
            return query;
        }
        let last_id = self.state.last_identifier.as_deref().unwrap_or_default();
        let direction = self.order.direction;
        if self.order.field == identifier {
            return beyond(query, identifier, last_id.into(), direction);
        }

        let class_name = self.query.class_name.clone();
        let position = ConstraintValue::Value(self.state.position.clone());
        let past_position = beyond(
            Query::new(class_name.clone()),
            &self.order.field,
            position.clone(),
            direction,
        );
        let tied = beyond(
            Query::new(class_name).where_eq(self.order.field.clone(), position),
            identifier,
            last_id.into(),
            direction,
        );
        query.any_of([past_position, tied])
    }
}

/// Strictly after `value` in sort direction
fn beyond(query: Query, field: &str, value: ConstraintValue, direction: SortDirection) -> Query {
    match direction {
        SortDirection::Asc => query.gt(field, value),
        SortDirection::Desc => query.lt(field, value),
    }
}

fn clamp_page_size(requested: i64) -> CursorResult<u32> {
    if requested > i64::from(MAX_PAGE_SIZE) {
        return Err(CursorError::page_size_exceeded(requested, MAX_PAGE_SIZE));
    }
    Ok(requested.max(1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::RoleGraph;
    use crate::cursor::CursorErrorCode;
    use crate::query::{Aggregate, GroupBy};
    use crate::schema::SchemaCatalog;
    use crate::transport::{MemoryStore, TransportError};
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_documents(
                "Event",
                ["a", "b", "c", "d", "e"]
                    .iter()
                    .map(|id| json!({"objectId": id, "at": 10})),
            )
            .unwrap()
    }

    fn ids(page: &[Value]) -> Vec<&str> {
        page.iter().map(|d| d["objectId"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_page_size_bounds() {
        let err = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 1001).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorPageSizeExceeded);

        let cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 0).unwrap();
        assert_eq!(cursor.page_size(), 1);
        let cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), -7).unwrap();
        assert_eq!(cursor.page_size(), 1);
        let cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 1000).unwrap();
        assert_eq!(cursor.page_size(), 1000);
    }

    #[test]
    fn test_default_page_size_from_config() {
        let cursor =
            KeysetCursor::with_config(Query::new("Event"), SortSpec::asc("at"), &QueryConfig::default())
                .unwrap();
        assert_eq!(cursor.page_size(), 100);
    }

    #[test]
    fn test_grouped_query_not_pageable() {
        let query = Query::new("Event").group_by(GroupBy::new("at", Aggregate::Count));
        let err = KeysetCursor::new(query, SortSpec::asc("at"), 10).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorNotPageable);
    }

    #[test]
    fn test_tied_values_page_without_gaps() {
        let config = QueryConfig::default();
        let registry = SchemaCatalog::new();
        let roles = RoleGraph::new();
        let compiler = QueryCompiler::new(&config, &registry, &roles);
        let store = store();

        let mut cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 2).unwrap();
        assert_eq!(cursor.phase(), CursorPhase::Fresh);

        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["a", "b"]);
        assert_eq!(cursor.phase(), CursorPhase::Paging);
        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["c", "d"]);
        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["e"]);
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
        assert_eq!(cursor.state().items_fetched, 5);
        assert_eq!(cursor.state().last_identifier.as_deref(), Some("e"));

        let fetches = store.fetch_count();
        assert!(cursor.next_page(&compiler, &store).unwrap().is_empty());
        assert_eq!(store.fetch_count(), fetches);
    }

    #[test]
    fn test_descending_order() {
        let config = QueryConfig::default();
        let registry = SchemaCatalog::new();
        let roles = RoleGraph::new();
        let compiler = QueryCompiler::new(&config, &registry, &roles);
        let store = MemoryStore::new()
            .with_documents(
                "Score",
                vec![
                    json!({"objectId": "a", "points": 1}),
                    json!({"objectId": "b", "points": 3}),
                    json!({"objectId": "c", "points": 3}),
                    json!({"objectId": "d", "points": 2}),
                ],
            )
            .unwrap();

        let mut cursor = KeysetCursor::new(Query::new("Score"), SortSpec::desc("points"), 3).unwrap();
        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["c", "b", "d"]);
        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["a"]);
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
    }

    #[test]
    fn test_failed_fetch_leaves_state_untouched() {
        let config = QueryConfig::default();
        let registry = SchemaCatalog::new();
        let roles = RoleGraph::new();
        let compiler = QueryCompiler::new(&config, &registry, &roles);
        let store = store();

        let mut cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 2).unwrap();
        cursor.next_page(&compiler, &store).unwrap();
        let before = cursor.state().clone();

        store.fail_next(1);
        let err = cursor.next_page(&compiler, &store).unwrap_err();
        assert!(matches!(
            err.transport_error(),
            Some(TransportError::Unavailable(_))
        ));
        assert_eq!(cursor.state(), &before);

        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["c", "d"]);
    }

    #[test]
    fn test_missing_identifier_is_an_error_without_mutation() {
        let config = QueryConfig {
            identifier_field: "uuid".into(),
            ..QueryConfig::default()
        };
        let registry = SchemaCatalog::new();
        let roles = RoleGraph::new();
        let compiler = QueryCompiler::new(&config, &registry, &roles);
        let store = store();

        let mut cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 2).unwrap();
        let err = cursor.next_page(&compiler, &store).unwrap_err();
        assert_eq!(err.code(), CursorErrorCode::AeroqCursorMissingIdentifier);
        assert_eq!(cursor.state(), &CursorState::default());
    }

    #[test]
    fn test_reset_restarts() {
        let config = QueryConfig::default();
        let registry = SchemaCatalog::new();
        let roles = RoleGraph::new();
        let compiler = QueryCompiler::new(&config, &registry, &roles);
        let store = store();

        let mut cursor = KeysetCursor::new(Query::new("Event"), SortSpec::asc("at"), 4).unwrap();
        cursor.next_page(&compiler, &store).unwrap();
        cursor.next_page(&compiler, &store).unwrap();
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);

        cursor.reset();
        assert_eq!(cursor.phase(), CursorPhase::Fresh);
        assert_eq!(cursor.state(), &CursorState::default());
        assert_eq!(ids(&cursor.next_page(&compiler, &store).unwrap()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_page_query_shape() {
        let mut cursor = KeysetCursor::new(
            Query::new("Event").where_eq("kind", "x").skip(5).limit(50),
            SortSpec::asc("at"),
            10,
        )
        .unwrap();
        let first = cursor.page_query("objectId");
        assert_eq!(first.skip, None);
        assert_eq!(first.limit, Some(10));
        assert_eq!(first.order, vec![SortSpec::asc("at"), SortSpec::asc("objectId")]);
        assert_eq!(first.clauses.len(), 1);

        cursor.state.position = json!(10);
        cursor.state.last_identifier = Some("b".into());
        let next = cursor.page_query("objectId");
        assert_eq!(next.clauses.len(), 2);
        assert_eq!(next.constraints().len(), 4);
    }
}
