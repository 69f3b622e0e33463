//! # ACL/CLP Permission Engine
//!
//! Row-level visibility over stored read/write permission lists, role
//! hierarchy expansion, operation-level class permissions and field-level
//! filtering of fetched records.
//!
//! Everything here is a pure transform over caller-owned inputs. The role
//! graph is read, never mutated.

mod clp;
mod errors;
mod field_filter;
mod identity;
mod permissions;
mod roles;

pub use clp::{AccessPattern, ClassLevelPermissions, ClpOperation, OperationPermission};
pub use errors::{PermissionError, PermissionResult};
pub use field_filter::FieldFilter;
pub use identity::{Identity, PermissionSubject};
pub use permissions::PermissionCompiler;
pub use roles::RoleGraph;
