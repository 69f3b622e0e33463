//! Class-level permissions (CLP)
//!
//! Per-class operation grants plus the protected-field map consumed by
//! `FieldFilter`. The JSON shape matches the backend's:
//!
//! ```json
//! {"find": {"*": true},
//!  "get": {"requiresAuthentication": true},
//!  "create": {"role:Admin": true, "u42": true},
//!  "protectedFields": {"*": ["email"], "role:Admin": []}}
//! ```
//!
//! Operations with no entry are public. An operation whose entry is an
//! empty object is closed to every identity.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::errors::{PermissionError, PermissionResult};
use super::identity::Identity;
use super::roles::RoleGraph;
use crate::observability::{log_event_with_fields, Event};

const PROTECTED_FIELDS_KEY: &str = "protectedFields";
const REQUIRES_AUTH_KEY: &str = "requiresAuthentication";

static ROLE_NAME: OnceLock<Regex> = OnceLock::new();
static FIELD_NAME: OnceLock<Regex> = OnceLock::new();

fn role_name_re() -> &'static Regex {
    ROLE_NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\- ]+$").unwrap())
}

fn field_name_re() -> &'static Regex {
    FIELD_NAME.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap())
}

/// Identity selector used as a protected-field key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessPattern {
    /// `*`, matches every identity
    Public,
    /// `authenticated`, matches any identity with a user id
    Authenticated,
    /// `role:<name>`, matches holders of the role, directly or inherited
    Role(String),
    /// `userField:<field>`, matches when the record's field points at the user
    UserField(String),
}

impl AccessPattern {
    pub fn parse(s: &str) -> PermissionResult<Self> {
        let invalid = || PermissionError::InvalidAccessPattern(s.to_string());
        match s {
            "*" => Ok(AccessPattern::Public),
            "authenticated" => Ok(AccessPattern::Authenticated),
            _ => {
                if let Some(name) = s.strip_prefix("role:") {
                    if role_name_re().is_match(name) {
                        return Ok(AccessPattern::Role(name.to_string()));
                    }
                } else if let Some(field) = s.strip_prefix("userField:") {
                    if field_name_re().is_match(field) {
                        return Ok(AccessPattern::UserField(field.to_string()));
                    }
                }
                Err(invalid())
            }
        }
    }
}

impl FromStr for AccessPattern {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessPattern::parse(s)
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPattern::Public => write!(f, "*"),
            AccessPattern::Authenticated => write!(f, "authenticated"),
            AccessPattern::Role(name) => write!(f, "role:{}", name),
            AccessPattern::UserField(field) => write!(f, "userField:{}", field),
        }
    }
}

/// Operations governed by class-level permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClpOperation {
    Find,
    Get,
    Count,
    Create,
    Update,
    Delete,
    AddField,
}

impl ClpOperation {
    pub const ALL: [ClpOperation; 7] = [
        ClpOperation::Find,
        ClpOperation::Get,
        ClpOperation::Count,
        ClpOperation::Create,
        ClpOperation::Update,
        ClpOperation::Delete,
        ClpOperation::AddField,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClpOperation::Find => "find",
            ClpOperation::Get => "get",
            ClpOperation::Count => "count",
            ClpOperation::Create => "create",
            ClpOperation::Update => "update",
            ClpOperation::Delete => "delete",
            ClpOperation::AddField => "addField",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        ClpOperation::ALL.iter().copied().find(|op| op.as_str() == key)
    }
}

impl fmt::Display for ClpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grant for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPermission {
    public: bool,
    requires_authentication: bool,
    roles: BTreeSet<String>,
    users: BTreeSet<String>,
}

impl OperationPermission {
    /// Open to everyone
    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }

    /// Open to any signed-in identity
    pub fn authenticated() -> Self {
        Self {
            requires_authentication: true,
            ..Self::default()
        }
    }

    /// Closed to every identity
    pub fn nobody() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, name: impl Into<String>) -> Self {
        self.roles.insert(name.into());
        self
    }

    pub fn with_user(mut self, id: impl Into<String>) -> Self {
        self.users.insert(id.into());
        self
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    fn is_closed(&self) -> bool {
        !self.public && !self.requires_authentication && self.roles.is_empty() && self.users.is_empty()
    }

    /// `expanded_roles` must already include inherited roles
    fn allows(&self, identity: &Identity, expanded_roles: &BTreeSet<String>) -> bool {
        if self.public {
            return true;
        }
        let Some(user_id) = identity.user_id.as_deref() else {
            return false;
        };
        self.requires_authentication
            || self.users.contains(user_id)
            || expanded_roles.iter().any(|r| self.roles.contains(r))
    }

    fn from_json(op: ClpOperation, value: &Value) -> PermissionResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            PermissionError::Malformed(format!("'{}' must be an object", op))
        })?;

        let mut perm = Self::default();
        for (key, flag) in map {
            let granted = flag.as_bool().ok_or_else(|| {
                PermissionError::Malformed(format!("'{}.{}' must be a boolean", op, key))
            })?;
            if !granted {
                continue;
            }
            match key.as_str() {
                "*" => perm.public = true,
                REQUIRES_AUTH_KEY => perm.requires_authentication = true,
                _ => match key.strip_prefix("role:") {
                    Some(name) if role_name_re().is_match(name) => {
                        perm.roles.insert(name.to_string());
                    }
                    Some(_) => return Err(PermissionError::InvalidAccessPattern(key.clone())),
                    None if key.is_empty() => {
                        return Err(PermissionError::InvalidAccessPattern(key.clone()))
                    }
                    None => {
                        perm.users.insert(key.clone());
                    }
                },
            }
        }
        Ok(perm)
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        if self.public {
            map.insert("*".into(), Value::Bool(true));
        }
        if self.requires_authentication {
            map.insert(REQUIRES_AUTH_KEY.into(), Value::Bool(true));
        }
        for role in &self.roles {
            map.insert(format!("role:{}", role), Value::Bool(true));
        }
        for user in &self.users {
            map.insert(user.clone(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

/// Class-level permission configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassLevelPermissions {
    operations: BTreeMap<ClpOperation, OperationPermission>,
    protected_fields: BTreeMap<AccessPattern, BTreeSet<String>>,
}

impl ClassLevelPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, op: ClpOperation, permission: OperationPermission) -> Self {
        self.operations.insert(op, permission);
        self
    }

    /// Hides `fields` from identities matching `pattern`
    pub fn with_protected_fields<I, S>(mut self, pattern: AccessPattern, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_fields
            .insert(pattern, fields.into_iter().map(Into::into).collect());
        self
    }

    /// String-pattern variant; malformed patterns fail here, never at filter time
    pub fn protect<I, S>(self, pattern: &str, fields: I) -> PermissionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = AccessPattern::parse(pattern)?;
        Ok(self.with_protected_fields(pattern, fields))
    }

    pub fn operation(&self, op: ClpOperation) -> Option<&OperationPermission> {
        self.operations.get(&op)
    }

    pub fn protected_fields(&self) -> &BTreeMap<AccessPattern, BTreeSet<String>> {
        &self.protected_fields
    }

    /// Operation-level enforcement
    pub fn check_operation(
        &self,
        op: ClpOperation,
        identity: &Identity,
        roles: &RoleGraph,
    ) -> PermissionResult<()> {
        let Some(permission) = self.operations.get(&op) else {
            return Ok(());
        };
        let expanded = roles.expand_all(identity.roles.iter().map(String::as_str));
        if permission.allows(identity, &expanded) {
            return Ok(());
        }

        let err = if !identity.is_authenticated() && !permission.is_closed() {
            PermissionError::AuthenticationRequired(op.as_str().to_string())
        } else {
            PermissionError::Forbidden(op.as_str().to_string())
        };
        log_event_with_fields(
            Event::OperationDenied,
            &[
                ("operation", op.as_str()),
                ("reason", &err.to_string()),
                ("user", identity.user_id.as_deref().unwrap_or("")),
            ],
        );
        Err(err)
    }

    /// Parses the backend JSON shape
    pub fn from_json(value: &Value) -> PermissionResult<Self> {
        Self::parse_json(value).inspect_err(|err| {
            log_event_with_fields(Event::PermissionConfigRejected, &[("reason", &err.to_string())]);
        })
    }

    fn parse_json(value: &Value) -> PermissionResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            PermissionError::Malformed("class-level permissions must be an object".to_string())
        })?;

        let mut clp = Self::new();
        for (key, entry) in map {
            if key == PROTECTED_FIELDS_KEY {
                clp.protected_fields = parse_protected_fields(entry)?;
                continue;
            }
            let op = ClpOperation::from_key(key).ok_or_else(|| {
                PermissionError::Malformed(format!("unknown operation '{}'", key))
            })?;
            clp.operations.insert(op, OperationPermission::from_json(op, entry)?);
        }
        Ok(clp)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (op, permission) in &self.operations {
            map.insert(op.as_str().to_string(), permission.to_json());
        }
        if !self.protected_fields.is_empty() {
            let protected: Map<String, Value> = self
                .protected_fields
                .iter()
                .map(|(pattern, fields)| {
                    let fields = fields.iter().cloned().map(Value::String).collect();
                    (pattern.to_string(), Value::Array(fields))
                })
                .collect();
            map.insert(PROTECTED_FIELDS_KEY.into(), Value::Object(protected));
        }
        Value::Object(map)
    }
}

fn parse_protected_fields(value: &Value) -> PermissionResult<BTreeMap<AccessPattern, BTreeSet<String>>> {
    let map = value.as_object().ok_or_else(|| {
        PermissionError::Malformed(format!("'{}' must be an object", PROTECTED_FIELDS_KEY))
    })?;

    let mut out = BTreeMap::new();
    for (key, fields) in map {
        let pattern = AccessPattern::parse(key)?;
        let fields = fields.as_array().ok_or_else(|| {
            PermissionError::Malformed(format!("protected fields for '{}' must be an array", key))
        })?;
        let mut set = BTreeSet::new();
        for field in fields {
            let name = field.as_str().ok_or_else(|| {
                PermissionError::Malformed(format!("protected field under '{}' must be a string", key))
            })?;
            set.insert(name.to_string());
        }
        out.insert(pattern, set);
    }
    Ok(out)
}
