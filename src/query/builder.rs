//! Fluent query builder
//!
//! Builder methods consume and return the query, appending one immutable
//! constraint per call. Constraints on the same field combine with AND
//! unless grouped with `any_of`.

use serde::{Deserialize, Serialize};

use super::constraint::{Clause, Constraint, Operator};
use super::value::{ConstraintValue, GeoPoint, GeoValue};
use crate::acl::{Identity, PermissionSubject};

/// Symbolic field carried by permission constraints. The compiler maps it
/// to the configured read or write permission list.
pub const PERMISSIONS_FIELD: &str = "ACL";

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Backend sort flag: 1 ascending, -1 descending
    pub fn as_flag(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Aggregate computed per group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
    /// One row per distinct group key
    Distinct,
}

impl Aggregate {
    /// Output field name in group results
    pub fn output_name(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum(_) => "sum",
            Aggregate::Average(_) => "avg",
            Aggregate::Min(_) => "min",
            Aggregate::Max(_) => "max",
            Aggregate::Distinct => "value",
        }
    }
}

/// Temporal bucket for grouping by date fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    Day,
    Month,
    Year,
}

impl DateUnit {
    /// strftime format truncating a date to this unit
    pub fn format(&self) -> &'static str {
        match self {
            DateUnit::Day => "%Y-%m-%d",
            DateUnit::Month => "%Y-%m",
            DateUnit::Year => "%Y",
        }
    }
}

/// Group-by specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupBy {
    pub field: String,
    pub aggregate: Aggregate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_unit: Option<DateUnit>,
}

impl GroupBy {
    pub fn new(field: impl Into<String>, aggregate: Aggregate) -> Self {
        Self {
            field: field.into(),
            aggregate,
            date_unit: None,
        }
    }

    pub fn by_date(mut self, unit: DateUnit) -> Self {
        self.date_unit = Some(unit);
        self
    }
}

/// Query definition over one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Query {
    pub class_name: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(default)]
    pub order: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    /// Pointer fields expanded into the referenced documents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
}

impl Query {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            clauses: Vec::new(),
            order: Vec::new(),
            skip: None,
            limit: None,
            keys: None,
            includes: Vec::new(),
            group_by: None,
        }
    }

    /// Appends a prebuilt constraint
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.clauses.push(Clause::Constraint(constraint));
        self
    }

    fn push(self, field: impl Into<String>, op: Operator, value: impl Into<ConstraintValue>) -> Self {
        self.constraint(Constraint::new(field, op, value))
    }

    fn push_list<V: Into<ConstraintValue>>(
        self,
        field: impl Into<String>,
        op: Operator,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let list = ConstraintValue::List(values.into_iter().map(Into::into).collect());
        self.push(field, op, list)
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.push(field, Operator::Eq, value)
    }

    pub fn where_ne(self, field: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.push(field, Operator::NotEq, value)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.push(field, Operator::Lt, value)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.push(field, Operator::Lte, value)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.push(field, Operator::Gt, value)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.push(field, Operator::Gte, value)
    }

    pub fn contained_in<V: Into<ConstraintValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_list(field, Operator::In, values)
    }

    pub fn not_contained_in<V: Into<ConstraintValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_list(field, Operator::NotIn, values)
    }

    pub fn exists(self, field: impl Into<String>, present: bool) -> Self {
        self.push(field, Operator::Exists, present)
    }

    pub fn regex(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(field, Operator::Regex, pattern.into())
    }

    pub fn starts_with(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.push(field, Operator::StartsWith, prefix.into())
    }

    pub fn ends_with(self, field: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.push(field, Operator::EndsWith, suffix.into())
    }

    pub fn contains_all<V: Into<ConstraintValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_list(field, Operator::ContainsAll, values)
    }

    pub fn array_equals<V: Into<ConstraintValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_list(field, Operator::ArrayEquals, values)
    }

    pub fn set_equals<V: Into<ConstraintValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_list(field, Operator::SetEquals, values)
    }

    pub fn size(self, field: impl Into<String>, n: i64) -> Self {
        self.push(field, Operator::Size, n)
    }

    pub fn size_gt(self, field: impl Into<String>, n: i64) -> Self {
        self.push(field, Operator::SizeGt, n)
    }

    pub fn size_gte(self, field: impl Into<String>, n: i64) -> Self {
        self.push(field, Operator::SizeGte, n)
    }

    pub fn size_lt(self, field: impl Into<String>, n: i64) -> Self {
        self.push(field, Operator::SizeLt, n)
    }

    pub fn size_lte(self, field: impl Into<String>, n: i64) -> Self {
        self.push(field, Operator::SizeLte, n)
    }

    /// `true`: the array is missing, null or empty. `false`: it has elements.
    pub fn empty_or_nil(self, field: impl Into<String>, empty: bool) -> Self {
        self.push(field, Operator::EmptyOrNil, empty)
    }

    pub fn near(
        self,
        field: impl Into<String>,
        point: GeoPoint,
        max_distance_radians: Option<f64>,
    ) -> Self {
        self.push(
            field,
            Operator::Near,
            ConstraintValue::Geo(GeoValue::Near {
                point,
                max_distance_radians,
            }),
        )
    }

    pub fn within_box(
        self,
        field: impl Into<String>,
        south_west: GeoPoint,
        north_east: GeoPoint,
    ) -> Self {
        self.push(
            field,
            Operator::WithinBox,
            ConstraintValue::Geo(GeoValue::Box {
                south_west,
                north_east,
            }),
        )
    }

    pub fn within_polygon(self, field: impl Into<String>, vertices: Vec<GeoPoint>) -> Self {
        self.push(
            field,
            Operator::WithinPolygon,
            ConstraintValue::Geo(GeoValue::Polygon(vertices)),
        )
    }

    /// Pointer in `field` references a document matched by `inner`
    pub fn matches_query(self, field: impl Into<String>, inner: Query) -> Self {
        self.push(field, Operator::MatchesQuery, ConstraintValue::Query(Box::new(inner)))
    }

    pub fn not_matches_query(self, field: impl Into<String>, inner: Query) -> Self {
        self.push(
            field,
            Operator::NotMatchesQuery,
            ConstraintValue::Query(Box::new(inner)),
        )
    }

    fn push_subjects<S: Into<PermissionSubject>>(
        self,
        op: Operator,
        subjects: impl IntoIterator<Item = S>,
    ) -> Self {
        let subjects = subjects.into_iter().map(Into::into).collect();
        self.push(PERMISSIONS_FIELD, op, ConstraintValue::Subjects(subjects))
    }

    /// Documents readable by any of the subjects (roles expanded at compile time)
    pub fn readable_by<S: Into<PermissionSubject>>(
        self,
        subjects: impl IntoIterator<Item = S>,
    ) -> Self {
        self.push_subjects(Operator::ReadableBy, subjects)
    }

    pub fn writable_by<S: Into<PermissionSubject>>(
        self,
        subjects: impl IntoIterator<Item = S>,
    ) -> Self {
        self.push_subjects(Operator::WritableBy, subjects)
    }

    /// Documents readable by the identity's user id or any of its roles;
    /// an anonymous identity reads only public documents
    pub fn readable_by_identity(self, identity: &Identity) -> Self {
        self.push_subjects(Operator::ReadableBy, identity_subjects(identity))
    }

    pub fn writable_by_identity(self, identity: &Identity) -> Self {
        self.push_subjects(Operator::WritableBy, identity_subjects(identity))
    }

    pub fn publicly_readable(self) -> Self {
        self.push_subjects(Operator::ReadableBy, [PermissionSubject::Public])
    }

    pub fn publicly_writable(self) -> Self {
        self.push_subjects(Operator::WritableBy, [PermissionSubject::Public])
    }

    /// The public entry is absent or the document is entirely private
    pub fn not_publicly_readable(self) -> Self {
        self.push_subjects(Operator::NotReadableBy, [PermissionSubject::Public])
    }

    pub fn not_publicly_writable(self) -> Self {
        self.push_subjects(Operator::NotWritableBy, [PermissionSubject::Public])
    }

    /// OR of branches; each branch is the AND of its own clauses
    pub fn any_of(mut self, branches: impl IntoIterator<Item = Query>) -> Self {
        let branches = branches.into_iter().map(|q| q.clauses).collect();
        self.clauses.push(Clause::AnyOf(branches));
        self
    }

    pub fn order_asc(mut self, field: impl Into<String>) -> Self {
        self.order.push(SortSpec::asc(field));
        self
    }

    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order.push(SortSpec::desc(field));
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn keys<K: Into<String>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.includes.push(field.into());
        self
    }

    pub fn group_by(mut self, group: GroupBy) -> Self {
        self.group_by = Some(group);
        self
    }

    /// Every constraint of the query, OR branches included, in clause order
    pub fn constraints(&self) -> Vec<&Constraint> {
        let mut out = Vec::new();
        for clause in &self.clauses {
            clause.for_each_constraint(&mut |c| out.push(c));
        }
        out
    }
}

fn identity_subjects(identity: &Identity) -> Vec<PermissionSubject> {
    let subjects = identity.subjects();
    if subjects.is_empty() {
        vec![PermissionSubject::Public]
    } else {
        subjects
    }
}
