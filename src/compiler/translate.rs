//! Operator translation
//!
//! One translation per operator variant. Each constraint becomes a single
//! filter term tagged with the pipeline stage it belongs to. Validation
//! runs in a fixed order per constraint: unsaved pointers, strict
//! booleans, type applicability, then value shape.

use regex::Regex;
use serde_json::{json, Value};

use super::compiled::CompiledQuery;
use super::compiler::QueryCompiler;
use super::filter::FilterDoc;
use crate::acl::{PermissionCompiler, PermissionError};
use crate::query::{
    Clause, Constraint, ConstraintValue, GeoValue, Operator, Query, QueryError, QueryResult,
};
use crate::schema::{ClassRegistry, FieldDef, FieldType};

/// Pipeline stage a term must be evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Placement {
    /// Plain condition on the queried class
    Index,
    /// Condition on a field reached through a pointer join
    Joined,
    /// Server-side expression
    Expression,
}

/// One top-level filter entry
#[derive(Debug, Clone)]
pub(crate) struct Term {
    pub key: String,
    pub value: Value,
    pub placement: Placement,
}

impl Term {
    fn new(key: impl Into<String>, value: Value, placement: Placement) -> Self {
        Self {
            key: key.into(),
            value,
            placement,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Join {
    pub field: String,
    pub target: String,
}

/// Pointer fields to join, in first-use order
#[derive(Debug, Default)]
pub(crate) struct Joins(Vec<Join>);

impl Joins {
    fn add(&mut self, field: &str, target: &str) {
        if !self.0.iter().any(|j| j.field == field) {
            self.0.push(Join {
                field: field.to_string(),
                target: target.to_string(),
            });
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Join> {
        self.0.iter()
    }
}

fn invalid(c: &Constraint, reason: &str) -> QueryError {
    QueryError::invalid_value(c.field(), c.operator().name(), reason)
}

/// Class name of the first raw or typed pointer lacking an object id
fn unsaved_pointer(value: &ConstraintValue) -> Option<String> {
    if let Some(p) = value.pointers().into_iter().find(|p| !p.is_saved()) {
        return Some(p.class_name.clone());
    }
    match value {
        ConstraintValue::Value(v) => unsaved_raw_pointer(v),
        ConstraintValue::List(items) => items.iter().find_map(unsaved_pointer),
        _ => None,
    }
}

fn unsaved_raw_pointer(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) if map.get("__type").and_then(Value::as_str) == Some("Pointer") => {
            let saved = map
                .get("objectId")
                .and_then(Value::as_str)
                .is_some_and(|id| !id.is_empty());
            if saved {
                None
            } else {
                Some(
                    map.get("className")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                )
            }
        }
        Value::Array(items) => items.iter().find_map(unsaved_raw_pointer),
        _ => None,
    }
}

/// `{"$ifNull": ["$field", []]}`
fn array_ref(field: &str) -> Value {
    json!({ "$ifNull": [format!("${}", field), []] })
}

impl<'a, R: ClassRegistry> QueryCompiler<'a, R> {
    pub(crate) fn clause_terms(
        &self,
        class_name: &str,
        clauses: &[Clause],
        joins: &mut Joins,
    ) -> QueryResult<Vec<Term>> {
        clauses
            .iter()
            .map(|clause| match clause {
                Clause::Constraint(c) => self.constraint_term(class_name, c, joins),
                Clause::AnyOf(branches) => self.any_of_term(class_name, branches, joins),
            })
            .collect()
    }

    fn any_of_term(
        &self,
        class_name: &str,
        branches: &[Vec<Clause>],
        joins: &mut Joins,
    ) -> QueryResult<Term> {
        if branches.is_empty() {
            return Err(QueryError::invalid_value(
                "$or",
                "any_of",
                "needs at least one branch",
            ));
        }
        let mut placement = Placement::Index;
        let mut rendered = Vec::with_capacity(branches.len());
        for branch in branches {
            let mut doc = FilterDoc::new();
            for term in self.clause_terms(class_name, branch, joins)? {
                placement = placement.max(term.placement);
                doc.add(term.key, term.value);
            }
            rendered.push(Value::Object(doc.into_map()));
        }
        Ok(Term::new("$or", Value::Array(rendered), placement))
    }

    fn constraint_term(
        &self,
        class_name: &str,
        c: &Constraint,
        joins: &mut Joins,
    ) -> QueryResult<Term> {
        let op = c.operator();
        if let Some(target) = unsaved_pointer(c.value()) {
            return Err(QueryError::unsaved_object(c.field(), op.name(), &target));
        }
        if op.requires_strict_boolean() && c.value().as_bool().is_none() {
            return Err(QueryError::invalid_boolean(c.field(), op.name()));
        }
        if op.is_permission() {
            return self.permission_term(c);
        }

        let (def, placement) = self.resolve_field(class_name, c.field(), joins);
        check_applicable(c, def)?;

        let field = c.field();
        let condition = match op {
            Operator::Eq => self.literal(c)?,
            Operator::NotEq => json!({ "$ne": self.literal(c)? }),
            Operator::Lt => json!({ "$lt": scalar(c)? }),
            Operator::Lte => json!({ "$lte": scalar(c)? }),
            Operator::Gt => json!({ "$gt": scalar(c)? }),
            Operator::Gte => json!({ "$gte": scalar(c)? }),
            Operator::In => json!({ "$in": list(c)? }),
            Operator::NotIn => json!({ "$nin": list(c)? }),
            Operator::Exists => json!({ "$exists": c.value().as_bool() }),
            Operator::Regex => {
                let pattern = string(c)?;
                Regex::new(pattern).map_err(|e| invalid(c, &e.to_string()))?;
                json!({ "$regex": pattern })
            }
            Operator::StartsWith => json!({ "$regex": format!("^{}", regex::escape(string(c)?)) }),
            Operator::EndsWith => json!({ "$regex": format!("{}$", regex::escape(string(c)?)) }),
            Operator::ContainsAll => json!({ "$all": list(c)? }),
            Operator::ArrayEquals => {
                let expr = json!({ "$eq": [array_ref(field), list(c)?] });
                return Ok(Term::new("$expr", expr, Placement::Expression));
            }
            Operator::SetEquals => {
                let expr = json!({ "$setEquals": [array_ref(field), list(c)?] });
                return Ok(Term::new("$expr", expr, Placement::Expression));
            }
            Operator::Size
            | Operator::SizeGt
            | Operator::SizeGte
            | Operator::SizeLt
            | Operator::SizeLte => {
                let cmp = match op {
                    Operator::Size => "$eq",
                    Operator::SizeGt => "$gt",
                    Operator::SizeGte => "$gte",
                    Operator::SizeLt => "$lt",
                    _ => "$lte",
                };
                let expr = json!({ cmp: [{ "$size": array_ref(field) }, count(c)?] });
                return Ok(Term::new("$expr", expr, Placement::Expression));
            }
            Operator::EmptyOrNil => {
                let cmp = if c.value().as_bool() == Some(true) { "$eq" } else { "$gt" };
                let expr = json!({ cmp: [{ "$size": array_ref(field) }, 0] });
                return Ok(Term::new("$expr", expr, Placement::Expression));
            }
            Operator::Near | Operator::WithinBox | Operator::WithinPolygon => geo(c)?,
            Operator::MatchesQuery | Operator::NotMatchesQuery => {
                let key = if op == Operator::MatchesQuery {
                    "$inQuery"
                } else {
                    "$notInQuery"
                };
                json!({ key: self.nested(c)? })
            }
            Operator::ReadableBy
            | Operator::WritableBy
            | Operator::NotReadableBy
            | Operator::NotWritableBy => unreachable!("permission operators handled above"),
        };
        Ok(Term::new(field, condition, placement))
    }

    /// Looks up the field type, recording a join for `pointer.rest` paths
    fn resolve_field(
        &self,
        class_name: &str,
        field: &str,
        joins: &mut Joins,
    ) -> (Option<&'a FieldDef>, Placement) {
        if let Some((head, rest)) = field.split_once('.') {
            let target = self
                .registry
                .field(class_name, head)
                .and_then(|def| def.field_type.pointer_target());
            if let Some(target) = target {
                joins.add(head, target);
                return (self.registry.field(target, rest), Placement::Joined);
            }
        }
        (self.registry.field(class_name, field), Placement::Index)
    }

    pub(crate) fn include_join(
        &self,
        class_name: &str,
        field: &str,
        joins: &mut Joins,
    ) -> QueryResult<()> {
        let def = self.registry.field(class_name, field);
        match def.and_then(|d| d.field_type.pointer_target()) {
            Some(target) => {
                joins.add(field, target);
                Ok(())
            }
            None => Err(QueryError::operator_not_applicable(
                field,
                "include",
                def.map(|d| d.field_type.type_name()).unwrap_or("unknown"),
            )),
        }
    }

    /// Equality operand: scalar, pointer or list
    fn literal(&self, c: &Constraint) -> QueryResult<Value> {
        match c.value() {
            ConstraintValue::Value(_) | ConstraintValue::Pointer(_) | ConstraintValue::List(_) => c
                .value()
                .to_json()
                .ok_or_else(|| invalid(c, "list elements must be scalars or pointers")),
            _ => Err(invalid(c, "expects a scalar, pointer or list")),
        }
    }

    fn permission_term(&self, c: &Constraint) -> QueryResult<Term> {
        let op = c.operator();
        let subjects = match c.value() {
            ConstraintValue::Subjects(s) if !s.is_empty() => s,
            _ => return Err(invalid(c, "expects at least one permission subject")),
        };
        let list_field = match op {
            Operator::ReadableBy | Operator::NotReadableBy => &self.config.read_permission_field,
            _ => &self.config.write_permission_field,
        };

        let engine = PermissionCompiler::new(self.roles, &self.config.public_marker);
        let to_query_error = |e: PermissionError| invalid(c, &e.to_string());
        let condition = match op {
            Operator::ReadableBy | Operator::WritableBy => engine
                .grant_condition(list_field, subjects)
                .map_err(to_query_error)?,
            _ => engine
                .exclusion_condition(list_field, subjects)
                .map_err(to_query_error)?,
        };

        let Value::Object(map) = condition else {
            return Err(invalid(c, "permission condition must be an object"));
        };
        let (key, value) = map
            .into_iter()
            .next()
            .ok_or_else(|| invalid(c, "empty permission condition"))?;
        Ok(Term::new(key, value, Placement::Index))
    }

    /// `{"where": …, "className": …}` for a flat-representable subquery
    fn nested(&self, c: &Constraint) -> QueryResult<Value> {
        let ConstraintValue::Query(inner) = c.value() else {
            return Err(invalid(c, "expects a nested query"));
        };
        let inner: &Query = inner;
        match self.build(inner, false)? {
            CompiledQuery::Flat(flat) => Ok(json!({
                "where": Value::Object(flat.filter),
                "className": flat.class_name,
            })),
            CompiledQuery::Pipeline(_) => {
                Err(QueryError::nested_pipeline(c.field(), c.operator().name()))
            }
        }
    }
}

fn check_applicable(c: &Constraint, def: Option<&FieldDef>) -> QueryResult<()> {
    let Some(def) = def else {
        return Ok(());
    };
    let op = c.operator();
    let ty = &def.field_type;
    let applicable = if op.is_array_operator() {
        ty.is_array_like()
    } else if op.is_geo() {
        *ty == FieldType::GeoPoint
    } else if op.is_ordering() {
        // Pointers order by objectId
        !matches!(ty, FieldType::Relation { .. } | FieldType::Acl)
    } else if op.is_string_match() {
        *ty == FieldType::String
    } else if matches!(op, Operator::MatchesQuery | Operator::NotMatchesQuery) {
        matches!(ty, FieldType::Pointer { .. } | FieldType::Relation { .. })
    } else {
        true
    };

    if applicable {
        Ok(())
    } else {
        Err(QueryError::operator_not_applicable(
            c.field(),
            op.name(),
            ty.type_name(),
        ))
    }
}

fn scalar(c: &Constraint) -> QueryResult<Value> {
    match c.value() {
        ConstraintValue::Value(v) if !v.is_array() => Ok(v.clone()),
        ConstraintValue::Pointer(p) => Ok(p.to_json()),
        _ => Err(invalid(c, "expects a scalar or pointer value")),
    }
}

fn list(c: &Constraint) -> QueryResult<Vec<Value>> {
    match c.value() {
        ConstraintValue::List(items) => items
            .iter()
            .map(|item| {
                item.to_json()
                    .ok_or_else(|| invalid(c, "list elements must be scalars or pointers"))
            })
            .collect(),
        ConstraintValue::Value(Value::Array(items)) => Ok(items.clone()),
        _ => Err(invalid(c, "expects a list")),
    }
}

fn string(c: &Constraint) -> QueryResult<&str> {
    match c.value() {
        ConstraintValue::Value(Value::String(s)) => Ok(s),
        _ => Err(invalid(c, "expects a string")),
    }
}

fn count(c: &Constraint) -> QueryResult<u64> {
    match c.value() {
        ConstraintValue::Value(v) => v
            .as_u64()
            .ok_or_else(|| invalid(c, "expects a non-negative integer")),
        _ => Err(invalid(c, "expects a non-negative integer")),
    }
}

fn geo(c: &Constraint) -> QueryResult<Value> {
    let ConstraintValue::Geo(shape) = c.value() else {
        return Err(invalid(c, "expects a geo value"));
    };
    let field = c.field();
    match shape {
        GeoValue::Near {
            point,
            max_distance_radians,
        } if c.operator() == Operator::Near => {
            point.validate(field)?;
            match max_distance_radians {
                Some(d) if !d.is_finite() || *d < 0.0 => {
                    Err(invalid(c, "max distance must be a non-negative number"))
                }
                Some(d) => Ok(json!({ "$nearSphere": point.to_json(), "$maxDistance": d })),
                None => Ok(json!({ "$nearSphere": point.to_json() })),
            }
        }
        GeoValue::Box {
            south_west,
            north_east,
        } if c.operator() == Operator::WithinBox => {
            south_west.validate(field)?;
            north_east.validate(field)?;
            if south_west.latitude > north_east.latitude {
                return Err(invalid(c, "south-west corner must lie south of north-east corner"));
            }
            Ok(json!({ "$within": { "$box": [south_west.to_json(), north_east.to_json()] } }))
        }
        GeoValue::Polygon(points) if c.operator() == Operator::WithinPolygon => {
            if points.len() < 3 {
                return Err(invalid(c, "polygon needs at least three points"));
            }
            for p in points {
                p.validate(field)?;
            }
            let points: Vec<Value> = points.iter().map(|p| p.to_json()).collect();
            Ok(json!({ "$geoWithin": { "$polygon": points } }))
        }
        _ => Err(invalid(c, "geo value does not match the operator")),
    }
}
