//! In-memory reference store
//!
//! Executes compiled queries against documents held in memory. Flat
//! queries run filter → sort → skip → limit → keys; pipelines run their
//! stages in order. Fetches can be made to fail on demand so callers can
//! exercise their error paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::errors::{TransportError, TransportResult};
use super::matcher::{evaluate, near_distance, values_equal, DocumentSource, FilterMatcher};
use super::sorter::{compare_values, get_path, DocumentSorter};
use super::DocumentStore;
use crate::compiler::{CompiledQuery, FlatQuery, Pipeline, Stage};

/// Documents grouped by class, in insertion order
pub struct MemoryStore {
    identifier_field: String,
    classes: BTreeMap<String, Vec<Value>>,
    pending_failures: AtomicUsize,
    fetches: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_identifier_field("objectId")
    }

    pub fn with_identifier_field(field: impl Into<String>) -> Self {
        Self {
            identifier_field: field.into(),
            classes: BTreeMap::new(),
            pending_failures: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Stores a document, assigning an identifier if it has none.
    /// Returns the identifier.
    pub fn insert(&mut self, class_name: &str, document: Value) -> TransportResult<String> {
        let Value::Object(mut map) = document else {
            return Err(TransportError::Rejected(
                "documents must be JSON objects".to_string(),
            ));
        };
        let id = match map.get(&self.identifier_field) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(_) => {
                return Err(TransportError::Rejected(format!(
                    "{} must be a non-empty string",
                    self.identifier_field
                )))
            }
            None => {
                let id = Uuid::new_v4().simple().to_string();
                map.insert(self.identifier_field.clone(), json!(id));
                id
            }
        };
        self.classes
            .entry(class_name.to_string())
            .or_default()
            .push(Value::Object(map));
        Ok(id)
    }

    /// Builder-style insert for fixtures
    pub fn with_documents(
        mut self,
        class_name: &str,
        documents: impl IntoIterator<Item = Value>,
    ) -> TransportResult<Self> {
        for document in documents {
            self.insert(class_name, document)?;
        }
        Ok(self)
    }

    /// Number of stored documents in a class
    pub fn len(&self, class_name: &str) -> usize {
        self.documents(class_name).len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(Vec::is_empty)
    }

    /// Makes the next `count` fetches fail with `Unavailable`
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, AtomicOrdering::SeqCst);
    }

    /// Total fetch attempts, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    fn run_flat(&self, query: &FlatQuery) -> TransportResult<Vec<Value>> {
        let mut results = self.select(&query.class_name, &query.filter)?;

        if query.order.is_empty() {
            if has_near(&query.filter) {
                results.sort_by(|a, b| {
                    let da = near_distance(a, &query.filter).unwrap_or(f64::MAX);
                    let db = near_distance(b, &query.filter).unwrap_or(f64::MAX);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        } else {
            DocumentSorter::sort(&mut results, &query.order);
        }

        let results = window(results, query.skip, query.limit);
        Ok(match &query.keys {
            Some(keys) => results
                .into_iter()
                .map(|doc| self.project(doc, keys))
                .collect(),
            None => results,
        })
    }

    fn run_pipeline(&self, pipeline: &Pipeline) -> TransportResult<Vec<Value>> {
        let mut docs: Vec<Value> = self.documents(&pipeline.class_name).to_vec();

        for stage in &pipeline.stages {
            docs = match stage {
                Stage::Match(filter) => {
                    let matcher = FilterMatcher::new(self);
                    let mut kept = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if matcher.matches(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                Stage::Lookup {
                    from,
                    local_field,
                    foreign_field,
                    as_field,
                } => docs
                    .into_iter()
                    .map(|doc| self.lookup(doc, from, local_field, foreign_field, as_field))
                    .collect(),
                Stage::Unwind(path) => docs.into_iter().flat_map(|doc| unwind(doc, path)).collect(),
                Stage::Project(keys) => docs
                    .into_iter()
                    .map(|doc| self.project(doc, keys))
                    .collect(),
                Stage::Group(spec) => group(&docs, spec)?,
                Stage::Sort(order) => {
                    DocumentSorter::sort(&mut docs, order);
                    docs
                }
                Stage::Skip(n) => docs.into_iter().skip(*n as usize).collect(),
                Stage::Limit(n) => docs.into_iter().take(*n as usize).collect(),
            };
        }
        Ok(docs)
    }

    fn select(&self, class_name: &str, filter: &Map<String, Value>) -> TransportResult<Vec<Value>> {
        let matcher = FilterMatcher::new(self);
        let mut results = Vec::new();
        for doc in self.documents(class_name) {
            if matcher.matches(doc, filter)? {
                results.push(doc.clone());
            }
        }
        Ok(results)
    }

    fn lookup(
        &self,
        mut doc: Value,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> Value {
        let local = get_path(&doc, local_field).cloned().unwrap_or(Value::Null);
        let joined: Vec<Value> = self
            .documents(from)
            .iter()
            .filter(|candidate| {
                let foreign = get_path(candidate, foreign_field).unwrap_or(&Value::Null);
                match &local {
                    Value::Array(items) => items.iter().any(|item| values_equal(item, foreign)),
                    value => values_equal(value, foreign),
                }
            })
            .cloned()
            .collect();
        if let Some(map) = doc.as_object_mut() {
            map.insert(as_field.to_string(), Value::Array(joined));
        }
        doc
    }

    /// Keeps the identifier plus the top-level fields named by `keys`
    fn project(&self, doc: Value, keys: &[String]) -> Value {
        let Value::Object(map) = doc else {
            return doc;
        };
        let wanted = |k: &str| {
            k == self.identifier_field
                || keys
                    .iter()
                    .any(|key| key.split('.').next() == Some(k))
        };
        Value::Object(map.into_iter().filter(|(k, _)| wanted(k)).collect())
    }
}

impl DocumentSource for MemoryStore {
    fn documents(&self, class_name: &str) -> &[Value] {
        self.classes
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn identifier_field(&self) -> &str {
        &self.identifier_field
    }
}

impl DocumentStore for MemoryStore {
    fn fetch(&self, query: &CompiledQuery) -> TransportResult<Vec<Value>> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(TransportError::Unavailable(
                "injected fetch failure".to_string(),
            ));
        }

        match query {
            CompiledQuery::Flat(flat) => self.run_flat(flat),
            CompiledQuery::Pipeline(pipeline) => self.run_pipeline(pipeline),
        }
    }
}

fn has_near(filter: &Map<String, Value>) -> bool {
    filter
        .values()
        .any(|condition| condition.get("$nearSphere").is_some())
}

fn window(docs: Vec<Value>, skip: Option<u64>, limit: Option<u64>) -> Vec<Value> {
    let skipped = docs.into_iter().skip(skip.unwrap_or(0) as usize);
    match limit {
        Some(n) => skipped.take(n as usize).collect(),
        None => skipped.collect(),
    }
}

/// One document per array element; empty or missing arrays keep the
/// document with the field removed
fn unwind(doc: Value, path: &str) -> Vec<Value> {
    let items = match doc.get(path) {
        Some(Value::Array(items)) => items.clone(),
        _ => return vec![doc],
    };
    if items.is_empty() {
        let mut doc = doc;
        if let Some(map) = doc.as_object_mut() {
            map.remove(path);
        }
        return vec![doc];
    }
    items
        .into_iter()
        .map(|item| {
            let mut copy = doc.clone();
            if let Some(map) = copy.as_object_mut() {
                map.insert(path.to_string(), item);
            }
            copy
        })
        .collect()
}

/// Running state of one accumulator
enum Accumulator {
    Sum { total: f64, integral: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn for_operator(op: &str) -> TransportResult<Self> {
        match op {
            "$sum" => Ok(Accumulator::Sum {
                total: 0.0,
                integral: true,
            }),
            "$avg" => Ok(Accumulator::Avg { total: 0.0, count: 0 }),
            "$min" => Ok(Accumulator::Min(None)),
            "$max" => Ok(Accumulator::Max(None)),
            other => Err(TransportError::Rejected(format!(
                "unsupported accumulator {}",
                other
            ))),
        }
    }

    fn add(&mut self, value: Value) {
        match self {
            Accumulator::Sum { total, integral } => {
                if let Value::Number(n) = &value {
                    *integral &= n.is_i64() || n.is_u64();
                    *total += n.as_f64().unwrap_or(0.0);
                }
            }
            Accumulator::Avg { total, count } => {
                if let Some(f) = value.as_f64() {
                    *total += f;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => keep_extreme(current, value, std::cmp::Ordering::Less),
            Accumulator::Max(current) => keep_extreme(current, value, std::cmp::Ordering::Greater),
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum { total, integral } if integral => json!(total as i64),
            Accumulator::Sum { total, .. } => json!(total),
            Accumulator::Avg { count: 0, .. } => Value::Null,
            Accumulator::Avg { total, count } => json!(total / count as f64),
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
        }
    }
}

fn keep_extreme(current: &mut Option<Value>, value: Value, want: std::cmp::Ordering) {
    if value.is_null() {
        return;
    }
    let replace = match current {
        Some(existing) => compare_values(Some(&value), Some(existing)) == want,
        None => true,
    };
    if replace {
        *current = Some(value);
    }
}

/// Groups by the `_id` expression; groups appear in first-seen order
fn group(docs: &[Value], spec: &Map<String, Value>) -> TransportResult<Vec<Value>> {
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| TransportError::Rejected("$group requires _id".to_string()))?;

    let mut accumulators: Vec<(&str, &str, &Value)> = Vec::new();
    for (name, body) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (op, operand) = body
            .as_object()
            .filter(|m| m.len() == 1)
            .and_then(|m| m.iter().next())
            .ok_or_else(|| {
                TransportError::Rejected(format!("accumulator {} must have one operator", name))
            })?;
        accumulators.push((name.as_str(), op.as_str(), operand));
    }

    let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();
    for doc in docs {
        let key = evaluate(doc, key_expr)?;
        let index = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(i) => i,
            None => {
                let fresh = accumulators
                    .iter()
                    .map(|(_, op, _)| Accumulator::for_operator(op))
                    .collect::<TransportResult<Vec<_>>>()?;
                groups.push((key, fresh));
                groups.len() - 1
            }
        };
        for (acc, (_, _, operand)) in groups[index].1.iter_mut().zip(&accumulators) {
            acc.add(evaluate(doc, operand)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key);
            for (acc, (name, _, _)) in accs.into_iter().zip(&accumulators) {
                out.insert(name.to_string(), acc.finish());
            }
            Value::Object(out)
        })
        .collect())
}
