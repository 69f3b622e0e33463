//! Compiled query forms
//!
//! A compiled query is either a flat filter document or an ordered
//! pipeline of named stages. Both render to the backend wire form with
//! `to_json`, and both are immutable once built.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{json, Map, Value};

use crate::query::SortSpec;

/// Why a query could not be expressed as a flat filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineReason {
    /// An operator needs server-side expression evaluation
    Expression,
    /// A constraint or include crosses a pointer field
    PointerJoin,
    /// Group-by with an aggregate
    Grouping,
}

impl PipelineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineReason::Expression => "EXPRESSION",
            PipelineReason::PointerJoin => "POINTER_JOIN",
            PipelineReason::Grouping => "GROUPING",
        }
    }
}

impl fmt::Display for PipelineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filter document plus query modifiers
#[derive(Debug, Clone, PartialEq)]
pub struct FlatQuery {
    pub class_name: String,
    /// Field → condition, ANDed implicitly
    pub filter: Map<String, Value>,
    pub order: Vec<SortSpec>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub keys: Option<Vec<String>>,
}

impl FlatQuery {
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("className".into(), json!(self.class_name));
        out.insert("filter".into(), Value::Object(self.filter.clone()));
        if !self.order.is_empty() {
            out.insert("sort".into(), sort_json(&self.order));
        }
        if let Some(skip) = self.skip {
            out.insert("skip".into(), json!(skip));
        }
        if let Some(limit) = self.limit {
            out.insert("limit".into(), json!(limit));
        }
        if let Some(keys) = &self.keys {
            out.insert("keys".into(), json!(keys));
        }
        Value::Object(out)
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Map<String, Value>),
    /// Joins the referenced class into `as_field`
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Flattens a joined array; documents with no match are kept
    Unwind(String),
    Project(Vec<String>),
    Group(Map<String, Value>),
    Sort(Vec<SortSpec>),
    Skip(u64),
    Limit(u64),
}

impl Stage {
    /// Wire stage name
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Lookup { .. } => "$lookup",
            Stage::Unwind(_) => "$unwind",
            Stage::Project(_) => "$project",
            Stage::Group(_) => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Skip(_) => "$skip",
            Stage::Limit(_) => "$limit",
        }
    }

    pub fn to_json(&self) -> Value {
        let body = match self {
            Stage::Match(filter) => Value::Object(filter.clone()),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => json!({
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "as": as_field,
            }),
            Stage::Unwind(path) => json!({
                "path": format!("${}", path),
                "preserveNullAndEmptyArrays": true,
            }),
            Stage::Project(keys) => {
                Value::Object(keys.iter().map(|k| (k.clone(), json!(1))).collect())
            }
            Stage::Group(spec) => Value::Object(spec.clone()),
            Stage::Sort(order) => sort_json(order),
            Stage::Skip(n) | Stage::Limit(n) => json!(n),
        };
        json!({ self.name(): body })
    }
}

/// Ordered aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub class_name: String,
    pub stages: Vec<Stage>,
    /// Diagnostic only; not part of the wire form
    pub reasons: BTreeSet<PipelineReason>,
}

impl Pipeline {
    pub fn to_json(&self) -> Value {
        json!({
            "className": self.class_name,
            "pipeline": self.stages.iter().map(Stage::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Backend-ready query
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledQuery {
    Flat(FlatQuery),
    Pipeline(Pipeline),
}

impl CompiledQuery {
    pub fn class_name(&self) -> &str {
        match self {
            CompiledQuery::Flat(q) => &q.class_name,
            CompiledQuery::Pipeline(p) => &p.class_name,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, CompiledQuery::Flat(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            CompiledQuery::Flat(q) => q.to_json(),
            CompiledQuery::Pipeline(p) => p.to_json(),
        }
    }
}

fn sort_json(order: &[SortSpec]) -> Value {
    Value::Object(
        order
            .iter()
            .map(|s| (s.field.clone(), json!(s.direction.as_flag())))
            .collect(),
    )
}
