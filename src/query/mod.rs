//! Query definitions
//!
//! Constraint nodes, constraint values and the fluent builder that
//! produces them. Nothing here talks to a store; the compiler turns a
//! `Query` into its backend form.

mod builder;
mod constraint;
mod errors;
mod value;

pub use builder::{
    Aggregate, DateUnit, GroupBy, Query, SortDirection, SortSpec, PERMISSIONS_FIELD,
};
pub use constraint::{Clause, Constraint, Operator};
pub use errors::{QueryError, QueryErrorCode, QueryResult};
pub use value::{ConstraintValue, GeoPoint, GeoValue, Pointer};
