//! Explain output for compiled queries
//!
//! Deterministic, human-readable diagnostics: compilation mode, the
//! reasons a pipeline was required, stage sequence and sort keys.

use std::fmt;

use super::compiled::{CompiledQuery, Stage};
use crate::query::{QueryError, SortSpec};

/// Explain plan output
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainPlan {
    /// Whether compilation succeeded
    pub accepted: bool,
    pub class_name: Option<String>,
    /// `FLAT` or `PIPELINE`
    pub mode: Option<String>,
    /// Pipeline-forcing reasons, sorted
    pub reasons: Vec<String>,
    /// Stage names in execution order
    pub stages: Vec<String>,
    /// Top-level filter keys (flat mode)
    pub filter_keys: Vec<String>,
    pub sort: Vec<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub rejection_reason: Option<String>,
    pub rejection_code: Option<String>,
}

fn sort_keys(order: &[SortSpec]) -> Vec<String> {
    order
        .iter()
        .map(|s| format!("{} {}", s.field, s.direction.as_str()))
        .collect()
}

impl ExplainPlan {
    /// Creates an explain plan from a compiled query
    pub fn from_compiled(compiled: &CompiledQuery) -> Self {
        let mut plan = Self {
            accepted: true,
            class_name: Some(compiled.class_name().to_string()),
            mode: None,
            reasons: Vec::new(),
            stages: Vec::new(),
            filter_keys: Vec::new(),
            sort: Vec::new(),
            skip: None,
            limit: None,
            rejection_reason: None,
            rejection_code: None,
        };

        match compiled {
            CompiledQuery::Flat(flat) => {
                plan.mode = Some("FLAT".to_string());
                plan.filter_keys = flat.filter.keys().cloned().collect();
                plan.sort = sort_keys(&flat.order);
                plan.skip = flat.skip;
                plan.limit = flat.limit;
            }
            CompiledQuery::Pipeline(pipeline) => {
                plan.mode = Some("PIPELINE".to_string());
                plan.reasons = pipeline.reasons.iter().map(|r| r.as_str().to_string()).collect();
                for stage in &pipeline.stages {
                    plan.stages.push(stage.name().to_string());
                    match stage {
                        Stage::Sort(order) => plan.sort = sort_keys(order),
                        Stage::Skip(n) => plan.skip = Some(*n),
                        Stage::Limit(n) => plan.limit = Some(*n),
                        _ => {}
                    }
                }
            }
        }
        plan
    }

    /// Creates an explain plan from a compilation error
    pub fn from_error(err: &QueryError) -> Self {
        Self {
            accepted: false,
            class_name: None,
            mode: None,
            reasons: Vec::new(),
            stages: Vec::new(),
            filter_keys: Vec::new(),
            sort: Vec::new(),
            skip: None,
            limit: None,
            rejection_reason: Some(err.message().to_string()),
            rejection_code: Some(err.code().code().to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            if let Some(class_name) = &self.class_name {
                writeln!(f, "Class: {}", class_name)?;
            }
            if let Some(mode) = &self.mode {
                writeln!(f, "Mode: {}", mode)?;
            }
            if !self.reasons.is_empty() {
                writeln!(f, "Pipeline Reasons: {}", self.reasons.join(", "))?;
            }
            if !self.filter_keys.is_empty() {
                writeln!(f, "Filter Keys: {}", self.filter_keys.join(", "))?;
            }
            if !self.stages.is_empty() {
                writeln!(f, "Stages:")?;
                for (i, stage) in self.stages.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, stage)?;
                }
            }
            if !self.sort.is_empty() {
                writeln!(f, "Sort: {}", self.sort.join(", "))?;
            }
            if let Some(skip) = self.skip {
                writeln!(f, "Skip: {}", skip)?;
            }
            if let Some(limit) = self.limit {
                writeln!(f, "Limit: {}", limit)?;
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::RoleGraph;
    use crate::compiler::QueryCompiler;
    use crate::config::QueryConfig;
    use crate::query::Query;
    use crate::schema::SchemaCatalog;

    fn compile(query: &Query) -> CompiledQuery {
        let config = QueryConfig::default();
        let registry = SchemaCatalog::new();
        let roles = RoleGraph::new();
        QueryCompiler::new(&config, &registry, &roles)
            .compile_for_pagination(query)
            .unwrap()
    }

    #[test]
    fn test_explain_flat() {
        let compiled = compile(&Query::new("Post").where_eq("a", 1i64).order_asc("b").limit(5));
        let explain = ExplainPlan::from_compiled(&compiled);

        assert!(explain.accepted);
        assert_eq!(explain.mode.as_deref(), Some("FLAT"));
        assert_eq!(explain.filter_keys, vec!["a"]);
        assert_eq!(explain.sort, vec!["b asc", "objectId asc"]);
        assert_eq!(explain.limit, Some(5));

        let output = format!("{}", explain);
        assert!(output.contains("ACCEPTED"));
        assert!(output.contains("Mode: FLAT"));
    }

    #[test]
    fn test_explain_pipeline() {
        let compiled = compile(&Query::new("Post").where_eq("a", 1i64).size("tags", 3).limit(2));
        let explain = ExplainPlan::from_compiled(&compiled);

        assert_eq!(explain.mode.as_deref(), Some("PIPELINE"));
        assert_eq!(explain.reasons, vec!["EXPRESSION"]);
        assert_eq!(explain.stages, vec!["$match", "$match", "$sort", "$limit"]);

        let output = format!("{}", explain);
        assert!(output.contains("1. $match"));
        assert!(output.contains("Pipeline Reasons: EXPRESSION"));
    }

    #[test]
    fn test_explain_rejected() {
        let err = QueryError::unsaved_object("tags", "in", "Tag");
        let explain = ExplainPlan::from_error(&err);

        assert!(!explain.accepted);
        assert_eq!(explain.rejection_code.as_deref(), Some("AEROQ_QUERY_UNSAVED_OBJECT"));
        assert!(format!("{}", explain).contains("REJECTED"));
    }

    #[test]
    fn test_explain_deterministic() {
        let query = Query::new("Post").where_eq("a", 1i64).empty_or_nil("tags", false);
        let a = format!("{}", ExplainPlan::from_compiled(&compile(&query)));
        let b = format!("{}", ExplainPlan::from_compiled(&compile(&query)));
        assert_eq!(a, b);
    }
}
