//! CLI command implementations
//!
//! Each command loads its inputs, runs one pure transform and prints the
//! result. Nothing is written to disk.

use std::path::Path;

use serde_json::Value;

use crate::acl::{ClassLevelPermissions, ClpOperation, FieldFilter, Identity, RoleGraph};
use crate::compiler::{ExplainPlan, QueryCompiler};
use crate::config::QueryConfig;
use crate::observability::Logger;
use crate::query::Query;
use crate::schema::SchemaCatalog;

use super::args::{Cli, Command, FilterArgs, QueryArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, write_response, write_text};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_min_severity(cli.log_level);
    run_command(cli.command)
}

/// Dispatch a parsed command
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Compile(args) => compile(&args),
        Command::Explain(args) => explain(&args),
        Command::Filter(args) => filter(&args),
    }
}

/// Print the compiled backend form
pub fn compile(args: &QueryArgs) -> CliResult<()> {
    write_response(compile_value(args)?)
}

/// Print the explain plan; rejected queries are explained, not failed
pub fn explain(args: &QueryArgs) -> CliResult<()> {
    write_text(&explain_plan(args)?.to_string())
}

/// Print the filtered record(s)
pub fn filter(args: &FilterArgs) -> CliResult<()> {
    write_response(filter_value(args)?)
}

/// Inputs loaded from disk for compile and explain
struct CompileContext {
    config: QueryConfig,
    catalog: SchemaCatalog,
    roles: RoleGraph,
    query: Query,
}

fn load_context(args: &QueryArgs) -> CliResult<CompileContext> {
    let config = match &args.config {
        Some(path) => QueryConfig::load(path)?,
        None => QueryConfig::default(),
    };
    let catalog = match &args.schema {
        Some(path) => SchemaCatalog::load(path)?,
        None => SchemaCatalog::new(),
    };
    let roles = load_roles(args.roles.as_deref())?;

    let mut query: Query = serde_json::from_value(read_json_file(&args.query)?)
        .map_err(|e| CliError::config_error(format!("Invalid query: {}", e)))?;
    if args.as_user.is_some() || !args.as_roles.is_empty() {
        query = query.readable_by_identity(&identity(args.as_user.as_deref(), &args.as_roles));
    }

    Ok(CompileContext {
        config,
        catalog,
        roles,
        query,
    })
}

fn load_roles(path: Option<&Path>) -> CliResult<RoleGraph> {
    match path {
        Some(path) => serde_json::from_value(read_json_file(path)?)
            .map_err(|e| CliError::config_error(format!("Invalid role graph: {}", e))),
        None => Ok(RoleGraph::new()),
    }
}

fn identity(user: Option<&str>, roles: &[String]) -> Identity {
    let base = match user {
        Some(id) => Identity::user(id),
        None => Identity::anonymous(),
    };
    roles.iter().fold(base, |identity, role| identity.with_role(role.as_str()))
}

/// Compiled query wire form
pub fn compile_value(args: &QueryArgs) -> CliResult<Value> {
    let ctx = load_context(args)?;
    let compiler = QueryCompiler::new(&ctx.config, &ctx.catalog, &ctx.roles);
    let compiled = if args.paginate {
        compiler.compile_for_pagination(&ctx.query)?
    } else {
        compiler.compile(&ctx.query)?
    };
    Ok(compiled.to_json())
}

/// Explain plan for the query, accepted or rejected
pub fn explain_plan(args: &QueryArgs) -> CliResult<ExplainPlan> {
    let ctx = load_context(args)?;
    let compiler = QueryCompiler::new(&ctx.config, &ctx.catalog, &ctx.roles);
    let result = if args.paginate {
        compiler.compile_for_pagination(&ctx.query)
    } else {
        compiler.compile(&ctx.query)
    };
    Ok(match result {
        Ok(compiled) => ExplainPlan::from_compiled(&compiled),
        Err(err) => ExplainPlan::from_error(&err),
    })
}

/// Records with protected fields removed
pub fn filter_value(args: &FilterArgs) -> CliResult<Value> {
    let permissions = ClassLevelPermissions::from_json(&read_json_file(&args.permissions)?)?;
    let roles = load_roles(args.roles.as_deref())?;
    let caller = identity(args.user.as_deref(), &args.roles_held);

    if let Some(name) = &args.operation {
        let op = ClpOperation::from_key(name)
            .ok_or_else(|| CliError::config_error(format!("Unknown operation '{}'", name)))?;
        permissions.check_operation(op, &caller, &roles)?;
    }

    let filter = FieldFilter::new(&permissions, &roles);
    Ok(match read_json_file(&args.record)? {
        Value::Array(records) => Value::Array(
            records
                .iter()
                .map(|r| filter.filter_value(r, &caller))
                .collect(),
        ),
        Value::Object(record) => Value::Object(filter.filter_fields(&record, &caller)),
        _ => {
            return Err(CliError::config_error(
                "Record file must hold an object or an array of objects",
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliErrorCode;
    use crate::query::{Constraint, Operator};
    use serde_json::json;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn file(content: Value) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        f
    }

    fn query_args(query: &NamedTempFile) -> QueryArgs {
        QueryArgs {
            query: query.path().to_path_buf(),
            schema: None,
            roles: None,
            config: None,
            paginate: false,
            as_user: None,
            as_roles: Vec::new(),
        }
    }

    fn filter_args(record: &NamedTempFile, permissions: &NamedTempFile) -> FilterArgs {
        FilterArgs {
            record: record.path().to_path_buf(),
            permissions: permissions.path().to_path_buf(),
            roles: None,
            user: None,
            roles_held: Vec::new(),
            operation: None,
        }
    }

    fn query_file(query: &Query) -> NamedTempFile {
        file(serde_json::to_value(query).unwrap())
    }

    fn non_boolean_exists() -> Query {
        Query::new("Post").constraint(Constraint::new("tags", Operator::Exists, "yes"))
    }

    #[test]
    fn test_compile_flat() {
        let q = query_file(&Query::new("Post").where_eq("status", "open").limit(5));
        let value = compile_value(&query_args(&q)).unwrap();
        assert_eq!(
            value,
            json!({"className": "Post", "filter": {"status": "open"}, "limit": 5})
        );
    }

    #[test]
    fn test_compile_with_paging_and_identity() {
        let q = query_file(&Query::new("Post").order_desc("createdAt"));
        let roles = file(json!({"Staff": ["Intern"]}));
        let mut args = query_args(&q);
        args.paginate = true;
        args.roles = Some(roles.path().to_path_buf());
        args.as_user = Some("u1".into());
        args.as_roles = vec!["Intern".into()];

        let value = compile_value(&args).unwrap();
        assert_eq!(value["sort"], json!({"createdAt": -1, "objectId": -1}));
        assert_eq!(
            value["filter"]["$or"][0]["_rperm"]["$in"],
            json!(["u1", "role:Intern", "role:Staff", "*"])
        );
    }

    #[test]
    fn test_compile_rejection_is_an_error() {
        let q = query_file(&non_boolean_exists());
        let err = compile_value(&query_args(&q)).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::QueryRejected);
    }

    #[test]
    fn test_explain_reports_rejection() {
        let q = query_file(&non_boolean_exists());
        let plan = explain_plan(&query_args(&q)).unwrap();
        assert!(!plan.accepted);
        assert_eq!(plan.rejection_code.as_deref(), Some("AEROQ_QUERY_INVALID_BOOLEAN"));
    }

    #[test]
    fn test_explain_with_schema_join() {
        let q = query_file(&Query::new("Post").where_eq("author.name", "amy"));
        let schema = file(json!([
            {"className": "Post", "fields": {"author": {"type": "Pointer", "targetClass": "_User"}}},
            {"className": "_User"}
        ]));
        let mut args = query_args(&q);
        args.schema = Some(schema.path().to_path_buf());

        let plan = explain_plan(&args).unwrap();
        assert_eq!(plan.mode.as_deref(), Some("PIPELINE"));
        assert_eq!(plan.reasons, vec!["POINTER_JOIN"]);
    }

    #[test]
    fn test_filter_records() {
        let record = file(json!([
            {"objectId": "a", "name": "amy", "email": "amy@example.com"},
            {"objectId": "b", "name": "bob", "email": "bob@example.com"}
        ]));
        let permissions = file(json!({"protectedFields": {"*": ["email"]}}));
        let value = filter_value(&filter_args(&record, &permissions)).unwrap();
        assert_eq!(
            value,
            json!([{"objectId": "a", "name": "amy"}, {"objectId": "b", "name": "bob"}])
        );
    }

    #[test]
    fn test_filter_checks_operation() {
        let record = file(json!({"objectId": "a"}));
        let permissions = file(json!({"find": {"requiresAuthentication": true}}));
        let mut args = filter_args(&record, &permissions);
        args.operation = Some("find".into());

        let err = filter_value(&args).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::PermissionDenied);

        args.user = Some("u1".into());
        assert_eq!(filter_value(&args).unwrap(), json!({"objectId": "a"}));
    }

    #[test]
    fn test_missing_file() {
        let args = QueryArgs {
            query: PathBuf::from("/nonexistent/query.json"),
            schema: None,
            roles: None,
            config: None,
            paginate: false,
            as_user: None,
            as_roles: Vec::new(),
        };
        assert_eq!(compile_value(&args).unwrap_err().code(), &CliErrorCode::IoError);
    }
}
