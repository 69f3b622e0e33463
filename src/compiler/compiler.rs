//! Query compiler
//!
//! Compiles a `Query` into a flat filter when every constraint and
//! modifier is representable without server-side expressions, joins or
//! grouping, and into a pipeline otherwise.
//!
//! Pipeline stage order:
//! 1. `$match` on index-usable conditions
//! 2. `$lookup` + `$unwind` per joined pointer field
//! 3. `$match` on joined fields
//! 4. `$match` with `$expr` conditions
//! 5. `$group`
//! 6. `$sort`, `$skip`, `$limit`
//! 7. `$project`
//!
//! Compilation is deterministic: identical inputs always produce identical
//! output, byte for byte.

use std::collections::BTreeSet;

use super::compiled::{CompiledQuery, FlatQuery, Pipeline, PipelineReason, Stage};
use super::filter::FilterDoc;
use super::translate::{Joins, Placement, Term};
use crate::acl::RoleGraph;
use crate::config::QueryConfig;
use crate::observability::{log_event_with_fields, Event};
use crate::query::{Query, QueryResult, SortSpec};
use crate::schema::ClassRegistry;

/// Compiles queries against a configuration, a class registry and a role graph
pub struct QueryCompiler<'a, R: ClassRegistry> {
    pub(super) config: &'a QueryConfig,
    pub(super) registry: &'a R,
    pub(super) roles: &'a RoleGraph,
}

impl<'a, R: ClassRegistry> QueryCompiler<'a, R> {
    pub fn new(config: &'a QueryConfig, registry: &'a R, roles: &'a RoleGraph) -> Self {
        Self {
            config,
            registry,
            roles,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        self.config
    }

    pub fn registry(&self) -> &R {
        self.registry
    }

    /// Compiles a query as written
    pub fn compile(&self, query: &Query) -> QueryResult<CompiledQuery> {
        self.logged(query, false)
    }

    /// Compiles a query for paging: the identifier is appended as a
    /// tie-break sort key unless the primary order field is unique
    pub fn compile_for_pagination(&self, query: &Query) -> QueryResult<CompiledQuery> {
        self.logged(query, true)
    }

    fn logged(&self, query: &Query, pagination: bool) -> QueryResult<CompiledQuery> {
        match self.build(query, pagination) {
            Ok(compiled) => {
                let mode = if compiled.is_flat() { "FLAT" } else { "PIPELINE" };
                log_event_with_fields(
                    Event::QueryCompiled,
                    &[("class", &query.class_name), ("mode", mode)],
                );
                Ok(compiled)
            }
            Err(err) => {
                log_event_with_fields(
                    Event::QueryRejected,
                    &[
                        ("class", &query.class_name),
                        ("code", err.code().code()),
                        ("field", err.field().unwrap_or("")),
                    ],
                );
                Err(err)
            }
        }
    }

    pub(super) fn build(&self, query: &Query, pagination: bool) -> QueryResult<CompiledQuery> {
        let class_name = query.class_name.as_str();
        let mut joins = Joins::default();
        let terms = self.clause_terms(class_name, &query.clauses, &mut joins)?;
        for include in &query.includes {
            self.include_join(class_name, include, &mut joins)?;
        }

        let mut order = query.order.clone();
        if pagination {
            self.append_tie_break(query, &mut order);
        }
        let keys = self.projection(query);

        let mut reasons = BTreeSet::new();
        if terms.iter().any(|t| t.placement == Placement::Expression) {
            reasons.insert(PipelineReason::Expression);
        }
        if !joins.is_empty() {
            reasons.insert(PipelineReason::PointerJoin);
        }
        if query.group_by.is_some() {
            reasons.insert(PipelineReason::Grouping);
        }

        if reasons.is_empty() {
            return Ok(CompiledQuery::Flat(FlatQuery {
                class_name: class_name.to_string(),
                filter: merge_all(terms),
                order,
                skip: query.skip,
                limit: query.limit,
                keys,
            }));
        }

        let mut stages = Vec::new();
        push_match(&mut stages, merge_placed(&terms, Placement::Index));
        for join in joins.iter() {
            stages.push(Stage::Lookup {
                from: join.target.clone(),
                local_field: format!("{}.{}", join.field, self.config.identifier_field),
                foreign_field: self.config.identifier_field.clone(),
                as_field: join.field.clone(),
            });
            stages.push(Stage::Unwind(join.field.clone()));
        }
        push_match(&mut stages, merge_placed(&terms, Placement::Joined));
        push_match(&mut stages, merge_placed(&terms, Placement::Expression));
        if let Some(group) = &query.group_by {
            stages.push(Stage::Group(self.group_stage(class_name, group)?));
        }
        if !order.is_empty() {
            stages.push(Stage::Sort(order));
        }
        if let Some(skip) = query.skip {
            stages.push(Stage::Skip(skip));
        }
        if let Some(limit) = query.limit {
            stages.push(Stage::Limit(limit));
        }
        if let Some(keys) = keys {
            stages.push(Stage::Project(keys));
        }

        Ok(CompiledQuery::Pipeline(Pipeline {
            class_name: class_name.to_string(),
            stages,
            reasons,
        }))
    }

    fn is_unique(&self, class_name: &str, field: &str) -> bool {
        self.config.is_unique_field(field)
            || self
                .registry
                .field(class_name, field)
                .is_some_and(|def| def.unique)
    }

    fn append_tie_break(&self, query: &Query, order: &mut Vec<SortSpec>) {
        // Group rows are keyed by `_id`, documents by the identifier
        let tie_break = if query.group_by.is_some() {
            "_id"
        } else {
            self.config.identifier_field.as_str()
        };
        if order.iter().any(|s| s.field == tie_break) {
            return;
        }
        let direction = match order.first() {
            Some(primary) if query.group_by.is_none() && self.is_unique(&query.class_name, &primary.field) => {
                return;
            }
            Some(primary) => primary.direction,
            None => Default::default(),
        };
        order.push(SortSpec {
            field: tie_break.to_string(),
            direction,
        });
    }

    /// Requested keys plus the identifier, which documents always carry
    fn projection(&self, query: &Query) -> Option<Vec<String>> {
        let mut keys = query.keys.clone()?;
        let id = &self.config.identifier_field;
        if query.group_by.is_none() && !keys.contains(id) {
            keys.insert(0, id.clone());
        }
        Some(keys)
    }
}

fn merge_all(terms: Vec<Term>) -> serde_json::Map<String, serde_json::Value> {
    let mut doc = FilterDoc::new();
    for term in terms {
        doc.add(term.key, term.value);
    }
    doc.into_map()
}

fn merge_placed(terms: &[Term], placement: Placement) -> FilterDoc {
    let mut doc = FilterDoc::new();
    for term in terms.iter().filter(|t| t.placement == placement) {
        doc.add(term.key.clone(), term.value.clone());
    }
    doc
}

fn push_match(stages: &mut Vec<Stage>, doc: FilterDoc) {
    if !doc.is_empty() {
        stages.push(Stage::Match(doc.into_map()));
    }
}
