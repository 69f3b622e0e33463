//! Role hierarchy
//!
//! An edge parent → child means members of the child role are granted
//! everything the parent role can see. Expanding a role therefore walks
//! child → parent edges: the result is the role itself plus every role
//! that transitively lists it as a child.
//!
//! The graph is owned by the caller and only read here. Cycles and
//! self-loops are tolerated; traversal never revisits a role.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Directed role graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, BTreeSet<String>>", into = "BTreeMap<String, BTreeSet<String>>")]
pub struct RoleGraph {
    children: BTreeMap<String, BTreeSet<String>>,
    parents: BTreeMap<String, BTreeSet<String>>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `child` is a child role of `parent`
    pub fn add_child(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        let parent = parent.into();
        let child = child.into();
        self.children
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        self.parents.entry(child).or_default().insert(parent);
    }

    /// Builder-style `add_child`
    pub fn with_child(mut self, parent: impl Into<String>, child: impl Into<String>) -> Self {
        self.add_child(parent, child);
        self
    }

    /// Direct children of a role
    pub fn children(&self, role: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(role)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The role plus every role whose grants flow down to it
    pub fn expand(&self, role: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        self.walk(role, &mut visited);
        visited
    }

    /// Union of `expand` over several roles, sharing one visited set
    pub fn expand_all<'r, I>(&self, roles: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut visited = BTreeSet::new();
        for role in roles {
            self.walk(role, &mut visited);
        }
        visited
    }

    fn walk(&self, start: &str, visited: &mut BTreeSet<String>) {
        if !visited.insert(start.to_string()) {
            return;
        }
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(role) = queue.pop_front() {
            if let Some(parents) = self.parents.get(&role) {
                for parent in parents {
                    if visited.insert(parent.clone()) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for RoleGraph {
    fn from(edges: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut graph = RoleGraph::new();
        for (parent, children) in edges {
            for child in children {
                graph.add_child(parent.clone(), child);
            }
        }
        graph
    }
}

impl From<RoleGraph> for BTreeMap<String, BTreeSet<String>> {
    fn from(graph: RoleGraph) -> Self {
        graph.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(roles: &[&str]) -> BTreeSet<String> {
        roles.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_expand_walks_to_ancestors() {
        let graph = RoleGraph::new()
            .with_child("Admin", "Moderator")
            .with_child("Moderator", "Member");

        assert_eq!(graph.expand("Member"), set(&["Admin", "Member", "Moderator"]));
        assert_eq!(graph.expand("Admin"), set(&["Admin"]));
    }

    #[test]
    fn test_unknown_role_expands_to_itself() {
        assert_eq!(RoleGraph::new().expand("Ghost"), set(&["Ghost"]));
    }

    #[test]
    fn test_self_loop_terminates() {
        let graph = RoleGraph::new().with_child("A", "A");
        assert_eq!(graph.expand("A"), set(&["A"]));
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = RoleGraph::new()
            .with_child("A", "B")
            .with_child("B", "C")
            .with_child("C", "A");
        assert_eq!(graph.expand("B"), set(&["A", "B", "C"]));
    }

    #[test]
    fn test_expand_all_unions() {
        let graph = RoleGraph::new().with_child("P", "X").with_child("Q", "Y");
        assert_eq!(graph.expand_all(["X", "Y"]), set(&["P", "Q", "X", "Y"]));
    }

    #[test]
    fn test_graph_json_shape() {
        let graph: RoleGraph =
            serde_json::from_str(r#"{"Admin": ["Moderator"], "Moderator": ["Member"]}"#).unwrap();
        assert!(graph.expand("Member").contains("Admin"));
        assert_eq!(graph.children("Admin").collect::<Vec<_>>(), vec!["Moderator"]);
    }
}
