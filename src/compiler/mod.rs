//! Constraint compiler
//!
//! Turns a `Query` into a backend-ready `CompiledQuery`.
//!
//! # Design Principles
//!
//! - Deterministic: same inputs produce the same output, byte for byte
//! - Correct mode: a flat filter only when nothing needs expressions,
//!   joins or grouping
//! - Fail fast: unsaved pointers, bad booleans and inapplicable operators
//!   are rejected before anything reaches the store
//! - Permission constraints expand the role hierarchy at compile time

mod aggregate;
mod compiled;
mod compiler;
mod explain;
mod filter;
mod translate;

pub use compiled::{CompiledQuery, FlatQuery, Pipeline, PipelineReason, Stage};
pub use compiler::QueryCompiler;
pub use explain::ExplainPlan;

/// Explain plan for a compiled query
pub fn explain(compiled: &CompiledQuery) -> ExplainPlan {
    ExplainPlan::from_compiled(compiled)
}
