//! JSON I/O handling for the CLI
//!
//! - Input: JSON files named on the command line
//! - Output: one JSON object per command on stdout
//! - UTF-8 only

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read and parse a JSON file
pub fn read_json_file(path: &Path) -> CliResult<Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read '{}': {}", path.display(), e)))?;
    if content.trim().is_empty() {
        return Err(CliError::io_error(format!("'{}' is empty", path.display())));
    }
    let value: Value = serde_json::from_str(&content)?;
    Ok(value)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write plain text to stdout
pub fn write_text(text: &str) -> CliResult<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", text)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_read_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"className": "Post"}}"#).unwrap();
        let value = read_json_file(file.path()).unwrap();
        assert_eq!(value["className"], "Post");
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = read_json_file(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "AEROQ_CLI_IO_ERROR");
    }
}
