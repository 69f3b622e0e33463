//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroquery compile --query <path> [--schema <path>] [--roles <path>] [--config <path>]
//! - aeroquery explain --query <path> [--schema <path>] [--roles <path>] [--config <path>]
//! - aeroquery filter --record <path> --permissions <path> [--user <id>] [--role <name>]...

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::Severity;

/// aeroquery - query compiler, permission engine and keyset cursor
#[derive(Parser, Debug)]
#[command(name = "aeroquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity written to stderr (trace, info, warn, error)
    #[arg(long = "log-level", global = true, default_value = "info")]
    pub log_level: Severity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a query to its backend form
    Compile(QueryArgs),

    /// Describe how a query compiles
    Explain(QueryArgs),

    /// Remove protected fields from records
    Filter(FilterArgs),
}

/// Inputs shared by compile and explain
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Query definition (JSON)
    #[arg(long)]
    pub query: PathBuf,

    /// Class schema catalog (JSON array)
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Role hierarchy: parent role → child roles (JSON object)
    #[arg(long)]
    pub roles: Option<PathBuf>,

    /// Query layer configuration (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append the identifier tie-break used for paging
    #[arg(long)]
    pub paginate: bool,

    /// Restrict results to documents readable by this user
    #[arg(long = "as-user")]
    pub as_user: Option<String>,

    /// Roles held by the reading identity (repeatable)
    #[arg(long = "as-role")]
    pub as_roles: Vec<String>,
}

/// Inputs for field filtering
#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// A record object or an array of records (JSON)
    #[arg(long)]
    pub record: PathBuf,

    /// Class-level permissions (JSON)
    #[arg(long)]
    pub permissions: PathBuf,

    /// Role hierarchy: parent role → child roles (JSON object)
    #[arg(long)]
    pub roles: Option<PathBuf>,

    /// Calling user id; omit for an anonymous caller
    #[arg(long)]
    pub user: Option<String>,

    /// Roles held by the caller (repeatable)
    #[arg(long = "role")]
    pub roles_held: Vec<String>,

    /// Check this operation (find, get, …) before filtering
    #[arg(long)]
    pub operation: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile() {
        let cli = Cli::try_parse_from([
            "aeroquery", "compile", "--query", "q.json", "--paginate", "--as-role", "Admin",
        ])
        .unwrap();
        match cli.command {
            Command::Compile(args) => {
                assert_eq!(args.query, PathBuf::from("q.json"));
                assert!(args.paginate);
                assert_eq!(args.as_roles, vec!["Admin".to_string()]);
                assert!(args.schema.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, Severity::Info);
    }

    #[test]
    fn test_parse_log_level() {
        let cli = Cli::try_parse_from([
            "aeroquery", "explain", "--query", "q.json", "--log-level", "trace",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Severity::Trace);
        match cli.command {
            Command::Explain(_) => {}
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_filter_requires_permissions() {
        assert!(Cli::try_parse_from(["aeroquery", "filter", "--record", "r.json"]).is_err());
    }
}
