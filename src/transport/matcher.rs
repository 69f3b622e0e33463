//! Filter and expression evaluation for the in-memory store
//!
//! Evaluates the wire filter documents the compiler produces against
//! stored JSON documents. Unknown operators are rejected rather than
//! ignored so a store never silently widens a result set.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};

use super::errors::{TransportError, TransportResult};
use super::sorter::{compare_values, get_path};

/// Read access to stored classes, for `$inQuery` and `$lookup`
pub trait DocumentSource {
    fn documents(&self, class_name: &str) -> &[Value];
    fn identifier_field(&self) -> &str;
}

/// Evaluates filter documents
pub struct FilterMatcher<'a> {
    source: &'a dyn DocumentSource,
}

impl<'a> FilterMatcher<'a> {
    pub fn new(source: &'a dyn DocumentSource) -> Self {
        Self { source }
    }

    /// Returns true if the document satisfies every entry of the filter
    pub fn matches(&self, document: &Value, filter: &Map<String, Value>) -> TransportResult<bool> {
        for (key, condition) in filter {
            let ok = match key.as_str() {
                "$or" => {
                    let mut any = false;
                    for branch in sub_filters(key, condition)? {
                        if self.matches(document, branch)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$and" => {
                    let mut all = true;
                    for branch in sub_filters(key, condition)? {
                        if !self.matches(document, branch)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$expr" => truthy(&evaluate(document, condition)?),
                op if op.starts_with('$') => {
                    return Err(TransportError::Rejected(format!(
                        "unsupported top-level operator {}",
                        op
                    )))
                }
                field => self.field_matches(get_path(document, field), condition)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn field_matches(&self, actual: Option<&Value>, condition: &Value) -> TransportResult<bool> {
        match condition {
            Value::Object(ops) if is_operator_object(ops) => {
                for (op, operand) in ops {
                    if !self.operator_matches(actual, op, operand, ops)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            literal => Ok(equals_or_contains(actual, literal)),
        }
    }

    fn operator_matches(
        &self,
        actual: Option<&Value>,
        op: &str,
        operand: &Value,
        siblings: &Map<String, Value>,
    ) -> TransportResult<bool> {
        let matched = match op {
            "$eq" => equals_or_contains(actual, operand),
            "$ne" => !equals_or_contains(actual, operand),
            "$gt" => compare_values(actual, Some(operand)) == Ordering::Greater,
            "$gte" => compare_values(actual, Some(operand)) != Ordering::Less,
            "$lt" => compare_values(actual, Some(operand)) == Ordering::Less,
            "$lte" => compare_values(actual, Some(operand)) != Ordering::Greater,
            "$in" => operand_list(op, operand)?
                .iter()
                .any(|candidate| equals_or_contains(actual, candidate)),
            "$nin" => !operand_list(op, operand)?
                .iter()
                .any(|candidate| equals_or_contains(actual, candidate)),
            "$exists" => {
                let wanted = operand.as_bool().ok_or_else(|| {
                    TransportError::Rejected("$exists expects a boolean".to_string())
                })?;
                actual.is_some() == wanted
            }
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    TransportError::Rejected("$regex expects a string".to_string())
                })?;
                let pattern = match siblings.get("$options").and_then(Value::as_str) {
                    Some(flags) if flags.contains('i') => format!("(?i){}", pattern),
                    _ => pattern.to_string(),
                };
                let re = Regex::new(&pattern)
                    .map_err(|e| TransportError::Rejected(format!("invalid $regex: {}", e)))?;
                match actual {
                    Some(Value::String(s)) => re.is_match(s),
                    Some(Value::Array(items)) => {
                        items.iter().filter_map(Value::as_str).any(|s| re.is_match(s))
                    }
                    _ => false,
                }
            }
            "$options" | "$maxDistance" => true,
            "$all" => {
                let wanted = operand_list(op, operand)?;
                match actual {
                    Some(Value::Array(items)) => wanted
                        .iter()
                        .all(|w| items.iter().any(|item| values_equal(item, w))),
                    _ => false,
                }
            }
            "$size" => {
                let n = operand.as_u64().ok_or_else(|| {
                    TransportError::Rejected("$size expects a non-negative integer".to_string())
                })?;
                matches!(actual, Some(Value::Array(items)) if items.len() as u64 == n)
            }
            "$nearSphere" => {
                let center = geo_point(operand).ok_or_else(|| {
                    TransportError::Rejected("$nearSphere expects a geo point".to_string())
                })?;
                match actual.and_then(geo_point) {
                    Some(point) => {
                        let distance = distance_radians(center, point);
                        siblings
                            .get("$maxDistance")
                            .and_then(Value::as_f64)
                            .map_or(true, |max| distance <= max)
                    }
                    None => false,
                }
            }
            "$within" => {
                let corners = operand
                    .get("$box")
                    .and_then(Value::as_array)
                    .filter(|c| c.len() == 2)
                    .and_then(|c| Some((geo_point(&c[0])?, geo_point(&c[1])?)))
                    .ok_or_else(|| {
                        TransportError::Rejected("$within expects a two-corner $box".to_string())
                    })?;
                actual
                    .and_then(geo_point)
                    .is_some_and(|p| in_box(p, corners.0, corners.1))
            }
            "$geoWithin" => {
                let polygon: Vec<(f64, f64)> = operand
                    .get("$polygon")
                    .and_then(Value::as_array)
                    .map(|points| points.iter().filter_map(geo_point).collect())
                    .unwrap_or_default();
                if polygon.len() < 3 {
                    return Err(TransportError::Rejected(
                        "$geoWithin expects a $polygon of at least three points".to_string(),
                    ));
                }
                actual
                    .and_then(geo_point)
                    .is_some_and(|p| in_polygon(p, &polygon))
            }
            "$inQuery" | "$notInQuery" => {
                let (class_name, filter) = subquery(op, operand)?;
                let ids = self.matching_ids(class_name, filter)?;
                let found = referenced_ids(actual).iter().any(|id| ids.contains(id));
                if op == "$inQuery" {
                    found
                } else {
                    !found
                }
            }
            other => {
                return Err(TransportError::Rejected(format!(
                    "unsupported operator {}",
                    other
                )))
            }
        };
        Ok(matched)
    }

    /// Identifiers of documents in `class_name` matching `filter`
    fn matching_ids(&self, class_name: &str, filter: &Map<String, Value>) -> TransportResult<Vec<String>> {
        let id_field = self.source.identifier_field();
        let mut ids = Vec::new();
        for document in self.source.documents(class_name) {
            if self.matches(document, filter)? {
                if let Some(id) = document.get(id_field).and_then(Value::as_str) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn sub_filters<'v>(op: &str, value: &'v Value) -> TransportResult<Vec<&'v Map<String, Value>>> {
    value
        .as_array()
        .ok_or_else(|| TransportError::Rejected(format!("{} expects an array", op)))?
        .iter()
        .map(|v| {
            v.as_object()
                .ok_or_else(|| TransportError::Rejected(format!("{} branches must be objects", op)))
        })
        .collect()
}

fn operand_list<'v>(op: &str, value: &'v Value) -> TransportResult<&'v Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| TransportError::Rejected(format!("{} expects an array", op)))
}

fn subquery<'v>(op: &str, value: &'v Value) -> TransportResult<(&'v str, &'v Map<String, Value>)> {
    let class_name = value.get("className").and_then(Value::as_str);
    let filter = value.get("where").and_then(Value::as_object);
    match (class_name, filter) {
        (Some(c), Some(f)) => Ok((c, f)),
        _ => Err(TransportError::Rejected(format!(
            "{} expects className and where",
            op
        ))),
    }
}

/// Object ids of a pointer, an id string, or an array of either
fn referenced_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Object(map)) => map
            .get("objectId")
            .and_then(Value::as_str)
            .map(|id| vec![id.to_string()])
            .unwrap_or_default(),
        Some(Value::Array(items)) => items
            .iter()
            .flat_map(|item| referenced_ids(Some(item)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Structural equality with numeric widening
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Equality; a scalar also matches any element of an array field
fn equals_or_contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
        None => expected.is_null(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// (latitude, longitude) of a geo point object
fn geo_point(value: &Value) -> Option<(f64, f64)> {
    Some((
        value.get("latitude")?.as_f64()?,
        value.get("longitude")?.as_f64()?,
    ))
}

/// Great-circle distance in radians
fn distance_radians(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

pub(crate) fn near_distance(document: &Value, filter: &Map<String, Value>) -> Option<f64> {
    filter.iter().find_map(|(field, condition)| {
        let center = geo_point(condition.get("$nearSphere")?)?;
        let point = geo_point(get_path(document, field)?)?;
        Some(distance_radians(center, point))
    })
}

fn in_box(p: (f64, f64), south_west: (f64, f64), north_east: (f64, f64)) -> bool {
    p.0 >= south_west.0 && p.0 <= north_east.0 && p.1 >= south_west.1 && p.1 <= north_east.1
}

/// Ray casting with longitude as x and latitude as y
fn in_polygon(p: (f64, f64), polygon: &[(f64, f64)]) -> bool {
    let (y, x) = p;
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (yi, xi) = polygon[i];
        let (yj, xj) = polygon[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Evaluates an aggregation expression against a document
pub(crate) fn evaluate(document: &Value, expr: &Value) -> TransportResult<Value> {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            Ok(get_path(document, &s[1..]).cloned().unwrap_or(Value::Null))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate(document, item))
            .collect::<TransportResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) if map.len() == 1 && is_operator_object(map) => {
            let (op, args) = map.iter().next().ok_or_else(|| {
                TransportError::Rejected("empty expression".to_string())
            })?;
            apply(document, op, args)
        }
        other => Ok(other.clone()),
    }
}

fn apply(document: &Value, op: &str, args: &Value) -> TransportResult<Value> {
    match op {
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let (a, b) = pair(document, op, args)?;
            let ordering = compare_values(Some(&a), Some(&b));
            let result = match op {
                "$eq" => values_equal(&a, &b),
                "$ne" => !values_equal(&a, &b),
                "$gt" => ordering == Ordering::Greater,
                "$gte" => ordering != Ordering::Less,
                "$lt" => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            };
            Ok(Value::Bool(result))
        }
        "$size" => match evaluate(document, args)? {
            Value::Array(items) => Ok(json!(items.len())),
            other => Err(TransportError::Rejected(format!(
                "$size requires an array, got {}",
                other
            ))),
        },
        "$ifNull" => {
            let (a, b) = pair(document, op, args)?;
            Ok(if a.is_null() { b } else { a })
        }
        "$setEquals" => {
            let (a, b) = pair(document, op, args)?;
            match (a, b) {
                (Value::Array(x), Value::Array(y)) => {
                    let covers = |l: &[Value], r: &[Value]| {
                        l.iter().all(|v| r.iter().any(|w| values_equal(v, w)))
                    };
                    Ok(Value::Bool(covers(&x, &y) && covers(&y, &x)))
                }
                _ => Err(TransportError::Rejected(
                    "$setEquals requires two arrays".to_string(),
                )),
            }
        }
        "$and" | "$or" => {
            let Value::Array(items) = args else {
                return Err(TransportError::Rejected(format!("{} expects an array", op)));
            };
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(truthy(&evaluate(document, item)?));
            }
            let result = if op == "$and" {
                values.iter().all(|v| *v)
            } else {
                values.iter().any(|v| *v)
            };
            Ok(Value::Bool(result))
        }
        "$dateToString" => {
            let format = args.get("format").and_then(Value::as_str).ok_or_else(|| {
                TransportError::Rejected("$dateToString expects a format".to_string())
            })?;
            let date = evaluate(document, args.get("date").unwrap_or(&Value::Null))?;
            Ok(match parse_date(&date) {
                Some(d) => json!(d.with_timezone(&Utc).format(format).to_string()),
                None => Value::Null,
            })
        }
        other => Err(TransportError::Rejected(format!(
            "unsupported expression operator {}",
            other
        ))),
    }
}

fn pair(document: &Value, op: &str, args: &Value) -> TransportResult<(Value, Value)> {
    match args {
        Value::Array(items) if items.len() == 2 => {
            Ok((evaluate(document, &items[0])?, evaluate(document, &items[1])?))
        }
        _ => Err(TransportError::Rejected(format!(
            "{} expects two arguments",
            op
        ))),
    }
}

/// RFC 3339 string, `{"__type": "Date", "iso": …}` or epoch milliseconds
fn parse_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok(),
        Value::Object(map) => parse_date(map.get("iso")?),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?).map(|d| d.fixed_offset()),
        _ => None,
    }
}
