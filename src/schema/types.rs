//! Typed attribute metadata
//!
//! Supplied by the mapping layer. The compiler trusts these types when
//! checking operator applicability and never infers them from data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::acl::ClassLevelPermissions;

/// Attribute types known to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    GeoPoint,
    Polygon,
    /// Reference to a single document of `target_class`
    Pointer {
        #[serde(rename = "targetClass")]
        target_class: String,
    },
    /// Many-to-many reference to `target_class`
    Relation {
        #[serde(rename = "targetClass")]
        target_class: String,
    },
    #[serde(rename = "ACL")]
    Acl,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::Array => "Array",
            FieldType::Object => "Object",
            FieldType::GeoPoint => "GeoPoint",
            FieldType::Polygon => "Polygon",
            FieldType::Pointer { .. } => "Pointer",
            FieldType::Relation { .. } => "Relation",
            FieldType::Acl => "ACL",
        }
    }

    /// Array operators apply to arrays and relations
    pub fn is_array_like(&self) -> bool {
        matches!(self, FieldType::Array | FieldType::Relation { .. })
    }

    /// Target class of a pointer field
    pub fn pointer_target(&self) -> Option<&str> {
        match self {
            FieldType::Pointer { target_class } => Some(target_class),
            _ => None,
        }
    }
}

/// Attribute definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether every document holds a distinct value
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl FieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            unique: false,
        }
    }

    pub fn unique(field_type: FieldType) -> Self {
        Self {
            field_type,
            unique: true,
        }
    }

    pub fn pointer(target_class: impl Into<String>) -> Self {
        Self::new(FieldType::Pointer {
            target_class: target_class.into(),
        })
    }
}

/// One registered class (collection) and its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSchema {
    pub class_name: String,
    pub fields: BTreeMap<String, FieldDef>,
    pub class_level_permissions: Option<ClassLevelPermissions>,
}

impl ClassSchema {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: BTreeMap::new(),
            class_level_permissions: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn with_permissions(mut self, clp: ClassLevelPermissions) -> Self {
        self.class_level_permissions = Some(clp);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}
