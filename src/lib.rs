//! aeroquery - query constraint compiler, permission engine and keyset cursor
//!
//! Translates typed query definitions into a document store's filter or
//! aggregation-pipeline form, enforces row-level and class-level
//! permissions, and pages through results with resumable keyset cursors.

pub mod acl;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod cursor;
pub mod observability;
pub mod query;
pub mod schema;
pub mod transport;
