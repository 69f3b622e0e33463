//! Row-level permission conditions
//!
//! Turns permission subjects into filter conditions over a document's
//! stored read or write list. Entries are rendered as bare user ids,
//! `role:<name>` and the public marker.
//!
//! A document without the list field at all is public. A document whose
//! list is present but empty is private.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use super::errors::{PermissionError, PermissionResult};
use super::identity::PermissionSubject;
use super::roles::RoleGraph;

/// Compiles permission subjects against a role graph
#[derive(Debug, Clone, Copy)]
pub struct PermissionCompiler<'a> {
    graph: &'a RoleGraph,
    public_marker: &'a str,
}

impl<'a> PermissionCompiler<'a> {
    pub fn new(graph: &'a RoleGraph, public_marker: &'a str) -> Self {
        Self {
            graph,
            public_marker,
        }
    }

    /// Stored-list entries granting any of the subjects access.
    ///
    /// Order is deterministic: user ids in input order, expanded roles
    /// sorted by name, then the public marker.
    pub fn permission_entries(&self, subjects: &[PermissionSubject]) -> PermissionResult<Vec<String>> {
        let mut users = Vec::new();
        let mut roles = Vec::new();
        for subject in subjects {
            match subject {
                PermissionSubject::Public => {}
                PermissionSubject::User(id) if id.is_empty() => {
                    return Err(PermissionError::InvalidSubject(id.clone()));
                }
                PermissionSubject::User(id) => {
                    if !users.contains(id) {
                        users.push(id.clone());
                    }
                }
                PermissionSubject::Role(name) if name.is_empty() => {
                    return Err(PermissionError::InvalidSubject(subject.to_string()));
                }
                PermissionSubject::Role(name) => roles.push(name.as_str()),
            }
        }

        let expanded: BTreeSet<String> = self.graph.expand_all(roles);
        let mut entries = users;
        entries.extend(expanded.into_iter().map(|r| format!("role:{}", r)));
        entries.push(self.public_marker.to_string());
        Ok(entries)
    }

    /// `{"$or": [{field: {"$in": entries}}, {field: {"$exists": false}}]}`
    pub fn grant_condition(&self, field: &str, subjects: &[PermissionSubject]) -> PermissionResult<Value> {
        let entries = self.permission_entries(subjects)?;
        Ok(json!({
            "$or": [
                { field: { "$in": entries } },
                { field: { "$exists": false } },
            ]
        }))
    }

    /// Documents whose stored list exists and grants none of the subjects
    pub fn exclusion_condition(&self, field: &str, subjects: &[PermissionSubject]) -> PermissionResult<Value> {
        let entries = self.permission_entries(subjects)?;
        Ok(json!({ field: { "$exists": true, "$nin": entries } }))
    }

    /// Evaluates a stored list directly, with the same absent/empty rules
    pub fn grants(&self, stored: Option<&Value>, subjects: &[PermissionSubject]) -> PermissionResult<bool> {
        let stored = match stored {
            None | Some(Value::Null) => return Ok(true),
            Some(Value::Array(items)) => items,
            Some(_) => return Ok(false),
        };
        let entries = self.permission_entries(subjects)?;
        Ok(stored
            .iter()
            .filter_map(Value::as_str)
            .any(|s| entries.iter().any(|e| e == s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_include_public_marker() {
        let graph = RoleGraph::new();
        let compiler = PermissionCompiler::new(&graph, "*");
        let entries = compiler
            .permission_entries(&[PermissionSubject::user("u1")])
            .unwrap();
        assert_eq!(entries, vec!["u1", "*"]);
    }

    #[test]
    fn test_entries_expand_roles() {
        let graph = RoleGraph::new().with_child("R2", "R1");
        let compiler = PermissionCompiler::new(&graph, "*");
        let entries = compiler
            .permission_entries(&[PermissionSubject::role("R1")])
            .unwrap();
        assert_eq!(entries, vec!["role:R1", "role:R2", "*"]);
    }

    #[test]
    fn test_public_only() {
        let graph = RoleGraph::new();
        let compiler = PermissionCompiler::new(&graph, "*");
        let entries = compiler
            .permission_entries(&[PermissionSubject::Public])
            .unwrap();
        assert_eq!(entries, vec!["*"]);
    }

    #[test]
    fn test_grant_condition_shape() {
        let graph = RoleGraph::new();
        let compiler = PermissionCompiler::new(&graph, "*");
        let condition = compiler
            .grant_condition("_rperm", &[PermissionSubject::user("u1")])
            .unwrap();
        assert_eq!(
            condition,
            json!({"$or": [
                {"_rperm": {"$in": ["u1", "*"]}},
                {"_rperm": {"$exists": false}}
            ]})
        );
    }

    #[test]
    fn test_exclusion_condition_shape() {
        let graph = RoleGraph::new();
        let compiler = PermissionCompiler::new(&graph, "*");
        let condition = compiler
            .exclusion_condition("_rperm", &[PermissionSubject::Public])
            .unwrap();
        assert_eq!(condition, json!({"_rperm": {"$exists": true, "$nin": ["*"]}}));
    }

    #[test]
    fn test_absent_list_is_public_and_empty_list_is_private() {
        let graph = RoleGraph::new();
        let compiler = PermissionCompiler::new(&graph, "*");
        let anyone = [PermissionSubject::user("u1")];

        assert!(compiler.grants(None, &anyone).unwrap());
        assert!(!compiler.grants(Some(&json!([])), &anyone).unwrap());
        assert!(compiler.grants(Some(&json!(["u1"])), &anyone).unwrap());
        assert!(compiler.grants(Some(&json!(["*"])), &anyone).unwrap());
    }

    #[test]
    fn test_empty_role_name_rejected() {
        let graph = RoleGraph::new();
        let compiler = PermissionCompiler::new(&graph, "*");
        let result = compiler.permission_entries(&[PermissionSubject::role("")]);
        assert!(matches!(result, Err(PermissionError::InvalidSubject(_))));
    }
}
