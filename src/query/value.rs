//! Constraint values
//!
//! Scalars travel as raw JSON. Pointers, geo shapes, nested queries and
//! permission subjects are typed so the compiler can validate them before
//! rendering the backend wire form.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::builder::Query;
use super::errors::{QueryError, QueryResult};
use crate::acl::PermissionSubject;

/// Reference to a document of another class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Pointer {
    pub class_name: String,
    /// None for an object that was never saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl Pointer {
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: Some(object_id.into()),
        }
    }

    /// Pointer to an object that has no identifier yet
    pub fn unsaved(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.object_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Backend wire form. Callers must check `is_saved` first.
    pub fn to_json(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }
}

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> QueryResult<Self> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate("location")?;
        Ok(point)
    }

    pub(crate) fn validate(&self, field: &str) -> QueryResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(QueryError::invalid_value(
                field,
                "geo",
                "latitude must be within [-90, 90]",
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(QueryError::invalid_value(
                field,
                "geo",
                "longitude must be within [-180, 180]",
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "__type": "GeoPoint",
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}

/// Geo shapes used by the geo operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoValue {
    /// Proximity search, optionally bounded by a distance in radians
    Near {
        point: GeoPoint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_distance_radians: Option<f64>,
    },
    /// Rectangle given by its south-west and north-east corners
    Box {
        south_west: GeoPoint,
        north_east: GeoPoint,
    },
    /// Closed polygon, at least three vertices
    Polygon(Vec<GeoPoint>),
}

/// Right-hand side of a constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintValue {
    Value(Value),
    Pointer(Pointer),
    List(Vec<ConstraintValue>),
    Query(Box<Query>),
    Subjects(Vec<PermissionSubject>),
    Geo(GeoValue),
}

impl ConstraintValue {
    /// Strict boolean, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstraintValue::Value(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Iterates every pointer in this value, descending into lists
    pub fn pointers(&self) -> Vec<&Pointer> {
        let mut out = Vec::new();
        self.collect_pointers(&mut out);
        out
    }

    fn collect_pointers<'a>(&'a self, out: &mut Vec<&'a Pointer>) {
        match self {
            ConstraintValue::Pointer(p) => out.push(p),
            ConstraintValue::List(items) => {
                for item in items {
                    item.collect_pointers(out);
                }
            }
            _ => {}
        }
    }

    /// Renders scalars, pointers and lists to backend JSON
    pub fn to_json(&self) -> Option<Value> {
        match self {
            ConstraintValue::Value(v) => Some(v.clone()),
            ConstraintValue::Pointer(p) => Some(p.to_json()),
            ConstraintValue::List(items) => items
                .iter()
                .map(ConstraintValue::to_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            ConstraintValue::Geo(GeoValue::Near { point, .. }) => Some(point.to_json()),
            _ => None,
        }
    }
}

impl From<Value> for ConstraintValue {
    fn from(v: Value) -> Self {
        ConstraintValue::Value(v)
    }
}

impl From<&str> for ConstraintValue {
    fn from(s: &str) -> Self {
        ConstraintValue::Value(Value::String(s.to_string()))
    }
}

impl From<String> for ConstraintValue {
    fn from(s: String) -> Self {
        ConstraintValue::Value(Value::String(s))
    }
}

impl From<i64> for ConstraintValue {
    fn from(n: i64) -> Self {
        ConstraintValue::Value(json!(n))
    }
}

impl From<f64> for ConstraintValue {
    fn from(n: f64) -> Self {
        ConstraintValue::Value(json!(n))
    }
}

impl From<bool> for ConstraintValue {
    fn from(b: bool) -> Self {
        ConstraintValue::Value(Value::Bool(b))
    }
}

impl From<Pointer> for ConstraintValue {
    fn from(p: Pointer) -> Self {
        ConstraintValue::Pointer(p)
    }
}

impl<T: Into<ConstraintValue>> From<Vec<T>> for ConstraintValue {
    fn from(items: Vec<T>) -> Self {
        ConstraintValue::List(items.into_iter().map(Into::into).collect())
    }
}
