//! Identities and permission subjects
//!
//! Identities come from the session provider; this crate never
//! authenticates. Subjects are the values accepted by `readable_by` and
//! `writable_by`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{PermissionError, PermissionResult};

const ROLE_PREFIX: &str = "role:";

/// One grantee of a stored permission list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PermissionSubject {
    /// Everyone, signed in or not
    Public,
    /// Bare user id
    User(String),
    /// Role name without the `role:` prefix
    Role(String),
}

impl PermissionSubject {
    /// Strict parse of `"*"`, `"public"`, `"role:<name>"` or a bare id
    pub fn parse(s: &str) -> PermissionResult<Self> {
        match s {
            "" => Err(PermissionError::InvalidSubject(s.to_string())),
            "*" | "public" => Ok(PermissionSubject::Public),
            _ => match s.strip_prefix(ROLE_PREFIX) {
                Some("") => Err(PermissionError::InvalidSubject(s.to_string())),
                Some(name) => Ok(PermissionSubject::Role(name.to_string())),
                None => Ok(PermissionSubject::User(s.to_string())),
            },
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        PermissionSubject::Role(name.into())
    }

    pub fn user(id: impl Into<String>) -> Self {
        PermissionSubject::User(id.into())
    }
}

impl fmt::Display for PermissionSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionSubject::Public => write!(f, "*"),
            PermissionSubject::User(id) => write!(f, "{}", id),
            PermissionSubject::Role(name) => write!(f, "{}{}", ROLE_PREFIX, name),
        }
    }
}

impl TryFrom<String> for PermissionSubject {
    type Error = PermissionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PermissionSubject::parse(&s)
    }
}

impl From<PermissionSubject> for String {
    fn from(subject: PermissionSubject) -> Self {
        subject.to_string()
    }
}

/// Lenient conversion for the builder; empty names are caught at compile time
impl From<&str> for PermissionSubject {
    fn from(s: &str) -> Self {
        match s {
            "*" | "public" => PermissionSubject::Public,
            _ => match s.strip_prefix(ROLE_PREFIX) {
                Some(name) => PermissionSubject::Role(name.to_string()),
                None => PermissionSubject::User(s.to_string()),
            },
        }
    }
}

/// Calling identity as resolved by the session provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Identity {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Directly held roles, before hierarchy expansion
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, name: impl Into<String>) -> Self {
        self.roles.insert(name.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The user id followed by every directly held role
    pub fn subjects(&self) -> Vec<PermissionSubject> {
        let mut out = Vec::with_capacity(self.roles.len() + 1);
        if let Some(id) = &self.user_id {
            out.push(PermissionSubject::User(id.clone()));
        }
        out.extend(self.roles.iter().cloned().map(PermissionSubject::Role));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subjects() {
        assert_eq!(PermissionSubject::parse("*").unwrap(), PermissionSubject::Public);
        assert_eq!(PermissionSubject::parse("public").unwrap(), PermissionSubject::Public);
        assert_eq!(
            PermissionSubject::parse("role:Admin").unwrap(),
            PermissionSubject::role("Admin")
        );
        assert_eq!(PermissionSubject::parse("u1").unwrap(), PermissionSubject::user("u1"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(PermissionSubject::parse("").is_err());
        assert!(PermissionSubject::parse("role:").is_err());
    }

    #[test]
    fn test_subject_serde_uses_entry_form() {
        let json = serde_json::to_string(&PermissionSubject::role("Mod")).unwrap();
        assert_eq!(json, "\"role:Mod\"");
        let back: PermissionSubject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PermissionSubject::role("Mod"));
    }

    #[test]
    fn test_identity_subjects() {
        let identity = Identity::user("u1").with_role("B").with_role("A");
        assert!(identity.is_authenticated());
        assert_eq!(
            identity.subjects(),
            vec![
                PermissionSubject::user("u1"),
                PermissionSubject::role("A"),
                PermissionSubject::role("B"),
            ]
        );
        assert!(Identity::anonymous().subjects().is_empty());
    }
}
