//! Class schema metadata
//!
//! Typed attribute definitions and the registry of known classes, as
//! supplied by the mapping layer. Read-only from the point of view of the
//! compiler, the permission engine and the cursor.

mod catalog;
mod errors;
mod types;

pub use catalog::{ClassRegistry, SchemaCatalog};
pub use errors::{SchemaError, SchemaResult};
pub use types::{ClassSchema, FieldDef, FieldType};
