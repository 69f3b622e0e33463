//! Field-level filtering
//!
//! Removes protected fields from an already fetched record. A field is
//! hidden only when every access pattern the identity matches protects
//! it; with no matching pattern nothing is hidden.
//!
//! Pure and synchronous. Filtering a filtered record with the same
//! identity returns it unchanged.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::clp::{AccessPattern, ClassLevelPermissions};
use super::identity::Identity;
use super::roles::RoleGraph;
use crate::observability::{log_event_with_fields, Event};

/// Applies a class's protected-field configuration
#[derive(Debug, Clone, Copy)]
pub struct FieldFilter<'a> {
    permissions: &'a ClassLevelPermissions,
    roles: &'a RoleGraph,
}

impl<'a> FieldFilter<'a> {
    pub fn new(permissions: &'a ClassLevelPermissions, roles: &'a RoleGraph) -> Self {
        Self { permissions, roles }
    }

    /// Fields of `record` hidden from `identity`
    pub fn hidden_fields(&self, record: &Map<String, Value>, identity: &Identity) -> BTreeSet<String> {
        let expanded = self
            .roles
            .expand_all(identity.roles.iter().map(String::as_str));

        let mut hidden: Option<BTreeSet<String>> = None;
        let mut exempt = BTreeSet::new();
        for (pattern, fields) in self.permissions.protected_fields() {
            if !matches_pattern(pattern, record, identity, &expanded) {
                continue;
            }
            if let AccessPattern::UserField(field) = pattern {
                exempt.insert(field.clone());
            }
            hidden = Some(match hidden {
                None => fields.clone(),
                Some(acc) => acc.intersection(fields).cloned().collect(),
            });
        }

        let mut hidden = hidden.unwrap_or_default();
        hidden.retain(|f| !exempt.contains(f) && record.contains_key(f));
        hidden
    }

    /// Copy of `record` without the hidden fields
    pub fn filter_fields(&self, record: &Map<String, Value>, identity: &Identity) -> Map<String, Value> {
        let hidden = self.hidden_fields(record, identity);
        if hidden.is_empty() {
            return record.clone();
        }

        log_event_with_fields(
            Event::FieldsFiltered,
            &[
                ("hidden", &hidden.len().to_string()),
                ("user", identity.user_id.as_deref().unwrap_or("")),
            ],
        );
        record
            .iter()
            .filter(|(k, _)| !hidden.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// `filter_fields` over a JSON value; non-objects pass through
    pub fn filter_value(&self, record: &Value, identity: &Identity) -> Value {
        match record {
            Value::Object(map) => Value::Object(self.filter_fields(map, identity)),
            other => other.clone(),
        }
    }
}

fn matches_pattern(
    pattern: &AccessPattern,
    record: &Map<String, Value>,
    identity: &Identity,
    expanded_roles: &BTreeSet<String>,
) -> bool {
    match pattern {
        AccessPattern::Public => true,
        AccessPattern::Authenticated => identity.is_authenticated(),
        AccessPattern::Role(name) => expanded_roles.contains(name),
        AccessPattern::UserField(field) => match (identity.user_id.as_deref(), record.get(field)) {
            (Some(user_id), Some(value)) => references_user(value, user_id),
            _ => false,
        },
    }
}

/// Pointer object, bare id string, or an array of either
fn references_user(value: &Value, user_id: &str) -> bool {
    match value {
        Value::String(id) => id == user_id,
        Value::Object(map) => map.get("objectId").and_then(Value::as_str) == Some(user_id),
        Value::Array(items) => items.iter().any(|v| references_user(v, user_id)),
        _ => false,
    }
}
