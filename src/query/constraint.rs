//! Constraint nodes
//!
//! A constraint is an immutable (field, operator, value) triple. Operators
//! form a closed set; each has a stable wire name used by serialized
//! queries and cursors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::QueryError;
use super::value::ConstraintValue;

/// Constraint operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Exists,
    Regex,
    StartsWith,
    EndsWith,
    ContainsAll,
    /// Stored array equals the value, element order included
    ArrayEquals,
    /// Stored array holds exactly the value's elements, order ignored
    SetEquals,
    Size,
    SizeGt,
    SizeGte,
    SizeLt,
    SizeLte,
    EmptyOrNil,
    Near,
    WithinBox,
    WithinPolygon,
    MatchesQuery,
    NotMatchesQuery,
    ReadableBy,
    WritableBy,
    NotReadableBy,
    NotWritableBy,
}

impl Operator {
    pub const ALL: [Operator; 30] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Lt,
        Operator::Lte,
        Operator::Gt,
        Operator::Gte,
        Operator::In,
        Operator::NotIn,
        Operator::Exists,
        Operator::Regex,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::ContainsAll,
        Operator::ArrayEquals,
        Operator::SetEquals,
        Operator::Size,
        Operator::SizeGt,
        Operator::SizeGte,
        Operator::SizeLt,
        Operator::SizeLte,
        Operator::EmptyOrNil,
        Operator::Near,
        Operator::WithinBox,
        Operator::WithinPolygon,
        Operator::MatchesQuery,
        Operator::NotMatchesQuery,
        Operator::ReadableBy,
        Operator::WritableBy,
        Operator::NotReadableBy,
        Operator::NotWritableBy,
    ];

    /// Stable wire name
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "ne",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::In => "in",
            Operator::NotIn => "nin",
            Operator::Exists => "exists",
            Operator::Regex => "regex",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::ContainsAll => "contains_all",
            Operator::ArrayEquals => "array_equals",
            Operator::SetEquals => "set_equals",
            Operator::Size => "size",
            Operator::SizeGt => "size_gt",
            Operator::SizeGte => "size_gte",
            Operator::SizeLt => "size_lt",
            Operator::SizeLte => "size_lte",
            Operator::EmptyOrNil => "empty_or_nil",
            Operator::Near => "near",
            Operator::WithinBox => "within_box",
            Operator::WithinPolygon => "within_polygon",
            Operator::MatchesQuery => "matches_query",
            Operator::NotMatchesQuery => "not_matches_query",
            Operator::ReadableBy => "readable_by",
            Operator::WritableBy => "writable_by",
            Operator::NotReadableBy => "not_readable_by",
            Operator::NotWritableBy => "not_writable_by",
        }
    }

    /// Needs server-side expression evaluation against the stored value
    pub fn requires_expression(&self) -> bool {
        matches!(
            self,
            Operator::ArrayEquals
                | Operator::SetEquals
                | Operator::Size
                | Operator::SizeGt
                | Operator::SizeGte
                | Operator::SizeLt
                | Operator::SizeLte
                | Operator::EmptyOrNil
        )
    }

    /// Only meaningful on array-valued fields
    pub fn is_array_operator(&self) -> bool {
        self.requires_expression() || *self == Operator::ContainsAll
    }

    pub fn is_geo(&self) -> bool {
        matches!(
            self,
            Operator::Near | Operator::WithinBox | Operator::WithinPolygon
        )
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
        )
    }

    pub fn is_string_match(&self) -> bool {
        matches!(
            self,
            Operator::Regex | Operator::StartsWith | Operator::EndsWith
        )
    }

    /// Operates on the stored read/write permission lists
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            Operator::ReadableBy
                | Operator::WritableBy
                | Operator::NotReadableBy
                | Operator::NotWritableBy
        )
    }

    /// Accepts only `true` or `false`
    pub fn requires_strict_boolean(&self) -> bool {
        matches!(self, Operator::Exists | Operator::EmptyOrNil)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| QueryError::unknown_operator(s))
    }
}

impl TryFrom<String> for Operator {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.name().to_string()
    }
}

/// Immutable (field, operator, value) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Constraint {
    field: String,
    operator: Operator,
    value: ConstraintValue,
}

impl Constraint {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<ConstraintValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Dot-separated path into the document
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &ConstraintValue {
        &self.value
    }
}

/// Top-level query term: a single constraint or an explicit OR group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Constraint(Constraint),
    /// Matches when every clause of at least one branch matches
    AnyOf(Vec<Vec<Clause>>),
}

impl Clause {
    /// Visits every constraint, descending into OR branches
    pub fn for_each_constraint<'a>(&'a self, f: &mut dyn FnMut(&'a Constraint)) {
        match self {
            Clause::Constraint(c) => f(c),
            Clause::AnyOf(branches) => {
                for clause in branches.iter().flatten() {
                    clause.for_each_constraint(f);
                }
            }
        }
    }
}
