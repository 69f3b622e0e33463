//! Document ordering for the in-memory store
//!
//! One total order shared by sorting and by the range operators, so a
//! keyset position compares exactly the way documents were sorted.
//!
//! Ordering rules:
//! - missing = null < bool < number < string < array < object
//! - dates (`{"__type": "Date", "iso": …}`) compare as their ISO string
//! - pointers compare by object id

use std::cmp::Ordering;

use serde_json::Value;

use crate::query::{SortDirection, SortSpec};

/// Sorts documents by a list of sort keys
pub struct DocumentSorter;

impl DocumentSorter {
    /// Stable multi-key sort
    pub fn sort(documents: &mut [Value], order: &[SortSpec]) {
        if order.is_empty() {
            return;
        }
        documents.sort_by(|a, b| {
            for spec in order {
                let ordering = compare_values(get_path(a, &spec.field), get_path(b, &spec.field));
                let ordering = match spec.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

/// Resolves a dotted path; missing segments yield None
pub fn get_path<'v>(document: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

/// Unwraps dates and pointers to their comparable scalar
fn normalize(value: &Value) -> &Value {
    if let Value::Object(map) = value {
        match map.get("__type").and_then(Value::as_str) {
            Some("Date") => return map.get("iso").unwrap_or(value),
            Some("Pointer") => return map.get("objectId").unwrap_or(value),
            _ => {}
        }
    }
    value
}

fn type_order(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over optional JSON values
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.map(normalize).unwrap_or(&Value::Null);
    let b = b.map(normalize).unwrap_or(&Value::Null);

    let by_type = type_order(a).cmp(&type_order(b));
    if by_type != Ordering::Equal {
        return by_type;
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                return xi.cmp(&yi);
            }
            let xf = x.as_f64().unwrap_or(0.0);
            let yf = y.as_f64().unwrap_or(0.0);
            xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ordering = compare_values(Some(xv), Some(yv));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort();
            yk.sort();
            for (xkey, ykey) in xk.iter().zip(yk.iter()) {
                let ordering = xkey
                    .cmp(ykey)
                    .then_with(|| compare_values(x.get(*xkey), y.get(*ykey)));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            xk.len().cmp(&yk.len())
        }
        _ => Ordering::Equal,
    }
}
