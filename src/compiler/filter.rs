//! Filter document assembly
//!
//! Terms are added in constraint order. Operator conditions on the same
//! key merge into one object when their operators do not overlap; any
//! other repeat of a key moves the later term into a top-level `$and`.

use serde_json::{Map, Value};

const AND: &str = "$and";

/// Deterministic filter document under construction
#[derive(Debug, Clone, Default)]
pub(crate) struct FilterDoc {
    map: Map<String, Value>,
}

impl FilterDoc {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn add(&mut self, key: String, value: Value) {
        if !self.map.contains_key(&key) {
            self.map.insert(key, value);
            return;
        }
        let mergeable = self
            .map
            .get(&key)
            .is_some_and(|existing| can_merge(existing, &value));

        if mergeable {
            if let (Some(Value::Object(existing)), Value::Object(incoming)) =
                (self.map.get_mut(&key), value)
            {
                existing.extend(incoming);
            }
            return;
        }

        let mut term = Map::new();
        term.insert(key, value);
        match self.map.get_mut(AND) {
            Some(Value::Array(items)) => items.push(Value::Object(term)),
            _ => {
                self.map
                    .insert(AND.to_string(), Value::Array(vec![Value::Object(term)]));
            }
        }
    }

    pub(crate) fn into_map(self) -> Map<String, Value> {
        self.map
    }
}

/// Both sides are `$`-operator objects with disjoint operators
fn can_merge(existing: &Value, incoming: &Value) -> bool {
    match (existing, incoming) {
        (Value::Object(a), Value::Object(b)) => {
            is_operator_object(a) && is_operator_object(b) && b.keys().all(|k| !a.contains_key(k))
        }
        _ => false,
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}
