//! Compiler Invariant Tests
//!
//! Properties of query compilation:
//! - Flat-expressible constraints always compile to a flat filter
//! - Any expression operator forces a pipeline
//! - Unsaved pointers are rejected wherever they appear
//! - Compilation is deterministic

use aeroquery::acl::RoleGraph;
use aeroquery::compiler::{explain, CompiledQuery, PipelineReason, QueryCompiler};
use aeroquery::config::QueryConfig;
use aeroquery::query::{Pointer, Query, QueryErrorCode};
use aeroquery::schema::SchemaCatalog;
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn compile(query: &Query) -> Result<CompiledQuery, QueryErrorCode> {
    let config = QueryConfig::default();
    let catalog = SchemaCatalog::new();
    let roles = RoleGraph::new();
    QueryCompiler::new(&config, &catalog, &roles)
        .compile(query)
        .map_err(|e| e.code())
}

/// Adds one flat-expressible constraint chosen by `choice`
fn flat_constraint(query: Query, choice: u8, n: i64) -> Query {
    let field = format!("f{}", choice);
    match choice % 10 {
        0 => query.where_eq(field, n),
        1 => query.where_ne(field, n),
        2 => query.lt(field, n),
        3 => query.gte(field, n),
        4 => query.contained_in(field, [n, n + 1]),
        5 => query.not_contained_in(field, [n]),
        6 => query.exists(field, n % 2 == 0),
        7 => query.starts_with(field, format!("p{}", n)),
        8 => query.contains_all(field, [n]),
        _ => query.publicly_readable(),
    }
}

fn choices() -> impl Strategy<Value = Vec<(u8, i64)>> {
    proptest::collection::vec((0u8..10, -50i64..50), 0..12)
}

// =============================================================================
// Mode Selection Properties
// =============================================================================

proptest! {
    /// Only flat operators: always a flat filter.
    #[test]
    fn test_flat_operators_compile_flat(ops in choices()) {
        let query = ops
            .iter()
            .fold(Query::new("Item"), |q, (choice, n)| flat_constraint(q, *choice, *n));
        let compiled = compile(&query).unwrap();
        prop_assert!(compiled.is_flat());
    }

    /// One set-equality constraint turns the same query into a pipeline.
    #[test]
    fn test_expression_operator_forces_pipeline(ops in choices()) {
        let query = ops
            .iter()
            .fold(Query::new("Item"), |q, (choice, n)| flat_constraint(q, *choice, *n))
            .set_equals("tags", ["a", "b"]);
        let compiled = compile(&query).unwrap();
        prop_assert!(!compiled.is_flat());
        match compiled {
            CompiledQuery::Pipeline(pipeline) => {
                prop_assert!(pipeline.reasons.contains(&PipelineReason::Expression));
            }
            CompiledQuery::Flat(_) => prop_assert!(false, "expected a pipeline"),
        }
    }

    /// An unsaved pointer anywhere in a list rejects the query.
    #[test]
    fn test_unsaved_pointer_in_list_rejected(saved in 0usize..6, position in 0usize..6) {
        let mut pointers: Vec<Pointer> = (0..saved)
            .map(|i| Pointer::new("_User", format!("u{}", i)))
            .collect();
        pointers.insert(position.min(saved), Pointer::unsaved("_User"));

        let query = Query::new("Post").contained_in("author", pointers);
        prop_assert_eq!(compile(&query).unwrap_err(), QueryErrorCode::AeroqUnsavedObject);
    }
}

// =============================================================================
// Determinism Tests
// =============================================================================

/// Same query compiles to byte-identical output.
#[test]
fn test_compilation_is_deterministic() {
    let query = Query::new("Post")
        .where_eq("status", "open")
        .gt("likes", 10i64)
        .size("tags", 2)
        .readable_by(["role:Editor", "u1"])
        .order_desc("likes")
        .limit(20);

    let first = compile(&query).unwrap().to_json().to_string();
    for _ in 0..20 {
        assert_eq!(compile(&query).unwrap().to_json().to_string(), first);
    }
}

/// Explain reflects the chosen mode.
#[test]
fn test_explain_mode() {
    let flat = compile(&Query::new("Post").where_eq("status", "open")).unwrap();
    assert_eq!(explain(&flat).mode.as_deref(), Some("FLAT"));

    let pipeline = compile(&Query::new("Post").empty_or_nil("tags", true)).unwrap();
    let plan = explain(&pipeline);
    assert_eq!(plan.mode.as_deref(), Some("PIPELINE"));
    assert_eq!(plan.reasons, vec!["EXPRESSION"]);
}

/// Saved pointers compile to the backend pointer shape.
#[test]
fn test_saved_pointer_equality() {
    let compiled = compile(&Query::new("Post").where_eq("author", Pointer::new("_User", "u1"))).unwrap();
    assert_eq!(
        compiled.to_json()["filter"]["author"],
        serde_json::json!({"__type": "Pointer", "className": "_User", "objectId": "u1"})
    );
}
