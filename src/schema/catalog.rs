//! Registry of known classes
//!
//! The catalog is a read-only view supplied by the mapping layer. Catalog
//! files hold a JSON array of class definitions in the backend shape:
//!
//! ```json
//! [{"className": "Post",
//!   "fields": {"author": {"type": "Pointer", "targetClass": "_User"}},
//!   "classLevelPermissions": {"find": {"*": true}}}]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::errors::{SchemaError, SchemaResult};
use super::types::{ClassSchema, FieldDef};
use crate::acl::ClassLevelPermissions;
use crate::observability::{log_event_with_fields, Event};

/// Read-only class metadata consumed by the compiler and the cursor
pub trait ClassRegistry {
    /// Returns true if the class is currently registered
    fn class_exists(&self, class_name: &str) -> bool;

    /// Returns the attribute definition, if the class declares it
    fn field(&self, class_name: &str, field: &str) -> Option<&FieldDef>;
}

/// In-memory class catalog
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    classes: BTreeMap<String, ClassSchema>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawClassSchema {
    class_name: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    class_level_permissions: Option<Value>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class, replacing nothing
    pub fn register(&mut self, schema: ClassSchema) -> SchemaResult<()> {
        if self.classes.contains_key(&schema.class_name) {
            return Err(SchemaError::DuplicateClass(schema.class_name));
        }
        self.classes.insert(schema.class_name.clone(), schema);
        Ok(())
    }

    /// Builder-style registration for fixtures
    pub fn with_class(mut self, schema: ClassSchema) -> SchemaResult<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Removes a class; cursors over it can no longer be resumed
    pub fn unregister(&mut self, class_name: &str) -> Option<ClassSchema> {
        self.classes.remove(class_name)
    }

    pub fn class(&self, class_name: &str) -> Option<&ClassSchema> {
        self.classes.get(class_name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Loads a catalog file
    pub fn load(path: &Path) -> SchemaResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| SchemaError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let catalog = Self::from_json_str(&content)?;
        log_event_with_fields(
            Event::SchemasLoaded,
            &[
                ("classes", &catalog.classes.len().to_string()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(catalog)
    }

    /// Parses catalog JSON
    pub fn from_json_str(content: &str) -> SchemaResult<Self> {
        let raw: Vec<RawClassSchema> =
            serde_json::from_str(content).map_err(|e| SchemaError::Malformed(e.to_string()))?;

        let mut catalog = Self::new();
        for entry in raw {
            let clp = match entry.class_level_permissions {
                Some(ref value) => Some(ClassLevelPermissions::from_json(value).map_err(
                    |source| SchemaError::InvalidPermissions {
                        class_name: entry.class_name.clone(),
                        source,
                    },
                )?),
                None => None,
            };
            catalog.register(ClassSchema {
                class_name: entry.class_name,
                fields: entry.fields,
                class_level_permissions: clp,
            })?;
        }
        Ok(catalog)
    }
}

impl ClassRegistry for SchemaCatalog {
    fn class_exists(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    fn field(&self, class_name: &str, field: &str) -> Option<&FieldDef> {
        self.classes.get(class_name).and_then(|c| c.field(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use std::io::Write;

    const CATALOG: &str = r#"[
        {"className": "Post",
         "fields": {
            "title": {"type": "String"},
            "tags": {"type": "Array"},
            "author": {"type": "Pointer", "targetClass": "_User"}
         },
         "classLevelPermissions": {
            "find": {"*": true},
            "protectedFields": {"*": ["draft"]}
         }},
        {"className": "_User", "fields": {"email": {"type": "String", "unique": true}}}
    ]"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = SchemaCatalog::from_json_str(CATALOG).unwrap();

        assert!(catalog.class_exists("Post"));
        assert!(catalog.class_exists("_User"));
        assert!(!catalog.class_exists("Comment"));

        let author = catalog.field("Post", "author").unwrap();
        assert_eq!(author.field_type.pointer_target(), Some("_User"));
        assert_eq!(
            catalog.field("Post", "tags").unwrap().field_type,
            FieldType::Array
        );
        assert!(catalog.field("_User", "email").unwrap().unique);
        assert!(catalog.class("Post").unwrap().class_level_permissions.is_some());
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let result = SchemaCatalog::new()
            .with_class(ClassSchema::new("Post"))
            .and_then(|c| c.with_class(ClassSchema::new("Post")));
        assert!(matches!(result, Err(SchemaError::DuplicateClass(name)) if name == "Post"));
    }

    #[test]
    fn test_invalid_permissions_rejected_at_load() {
        let content = r#"[{"className": "Post",
            "classLevelPermissions": {"protectedFields": {"owner:x": ["a"]}}}]"#;
        let result = SchemaCatalog::from_json_str(content);
        assert!(matches!(result, Err(SchemaError::InvalidPermissions { .. })));
    }

    #[test]
    fn test_unregister() {
        let mut catalog = SchemaCatalog::from_json_str(CATALOG).unwrap();
        assert!(catalog.unregister("Post").is_some());
        assert!(!catalog.class_exists("Post"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = SchemaCatalog::load(&path).unwrap();
        assert_eq!(catalog.class_names().collect::<Vec<_>>(), vec!["Post", "_User"]);
    }
}
