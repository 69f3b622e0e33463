//! Query error types
//!
//! Error codes:
//! - AEROQ_QUERY_UNSAVED_OBJECT (REJECT)
//! - AEROQ_QUERY_INVALID_BOOLEAN (REJECT)
//! - AEROQ_QUERY_UNKNOWN_OPERATOR (REJECT)
//! - AEROQ_QUERY_OPERATOR_NOT_APPLICABLE (REJECT)
//! - AEROQ_QUERY_INVALID_VALUE (REJECT)
//! - AEROQ_QUERY_NESTED_PIPELINE (REJECT)
//!
//! Every query error is a configuration error raised before any request
//! reaches the store. None of them is retried.

use std::fmt;

/// Severity levels for query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller request rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Query error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    /// A pointer value lacks an object id
    AeroqUnsavedObject,
    /// Operator requires a strict boolean
    AeroqInvalidBoolean,
    /// Operator name not recognized
    AeroqUnknownOperator,
    /// Operator does not apply to the field's type
    AeroqOperatorNotApplicable,
    /// Value has the wrong shape for the operator
    AeroqInvalidValue,
    /// Nested query cannot be expressed as a flat filter
    AeroqNestedPipeline,
}

impl QueryErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::AeroqUnsavedObject => "AEROQ_QUERY_UNSAVED_OBJECT",
            QueryErrorCode::AeroqInvalidBoolean => "AEROQ_QUERY_INVALID_BOOLEAN",
            QueryErrorCode::AeroqUnknownOperator => "AEROQ_QUERY_UNKNOWN_OPERATOR",
            QueryErrorCode::AeroqOperatorNotApplicable => "AEROQ_QUERY_OPERATOR_NOT_APPLICABLE",
            QueryErrorCode::AeroqInvalidValue => "AEROQ_QUERY_INVALID_VALUE",
            QueryErrorCode::AeroqNestedPipeline => "AEROQ_QUERY_NESTED_PIPELINE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Query error with full context
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
    field: Option<String>,
}

impl QueryError {
    /// A pointer in the value of `operator` on `field` has no object id
    pub fn unsaved_object(field: impl Into<String>, operator: &str, class_name: &str) -> Self {
        let f = field.into();
        Self {
            code: QueryErrorCode::AeroqUnsavedObject,
            message: format!(
                "Field '{}' operator '{}' references an unsaved {} object (no objectId)",
                f, operator, class_name
            ),
            field: Some(f),
        }
    }

    /// `operator` on `field` was given something other than true/false
    pub fn invalid_boolean(field: impl Into<String>, operator: &str) -> Self {
        let f = field.into();
        Self {
            code: QueryErrorCode::AeroqInvalidBoolean,
            message: format!(
                "Field '{}' operator '{}' requires a strict boolean value",
                f, operator
            ),
            field: Some(f),
        }
    }

    /// Operator name not recognized
    pub fn unknown_operator(name: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::AeroqUnknownOperator,
            message: format!("Unknown operator '{}'", name.into()),
            field: None,
        }
    }

    /// `operator` cannot be applied to a field of `type_name`
    pub fn operator_not_applicable(
        field: impl Into<String>,
        operator: &str,
        type_name: &str,
    ) -> Self {
        let f = field.into();
        Self {
            code: QueryErrorCode::AeroqOperatorNotApplicable,
            message: format!(
                "Operator '{}' cannot be applied to field '{}' of type {}",
                operator, f, type_name
            ),
            field: Some(f),
        }
    }

    /// Value shape does not fit the operator
    pub fn invalid_value(field: impl Into<String>, operator: &str, reason: &str) -> Self {
        let f = field.into();
        Self {
            code: QueryErrorCode::AeroqInvalidValue,
            message: format!("Field '{}' operator '{}': {}", f, operator, reason),
            field: Some(f),
        }
    }

    /// Subquery needs server-side expressions, joins or grouping
    pub fn nested_pipeline(field: impl Into<String>, operator: &str) -> Self {
        let f = field.into();
        Self {
            code: QueryErrorCode::AeroqNestedPipeline,
            message: format!(
                "Field '{}' operator '{}': nested query must compile to a flat filter",
                f, operator
            ),
            field: Some(f),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending field, if any
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for QueryError {}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QueryErrorCode::AeroqUnsavedObject.code(),
            "AEROQ_QUERY_UNSAVED_OBJECT"
        );
        assert_eq!(
            QueryErrorCode::AeroqUnknownOperator.code(),
            "AEROQ_QUERY_UNKNOWN_OPERATOR"
        );
        assert_eq!(
            QueryErrorCode::AeroqNestedPipeline.code(),
            "AEROQ_QUERY_NESTED_PIPELINE"
        );
    }

    #[test]
    fn test_error_names_field_and_operator() {
        let err = QueryError::unsaved_object("tags", "in", "Tag");
        let display = format!("{}", err);
        assert!(display.contains("AEROQ_QUERY_UNSAVED_OBJECT"));
        assert!(display.contains("tags"));
        assert!(display.contains("'in'"));
        assert_eq!(err.field(), Some("tags"));
    }

    #[test]
    fn test_unknown_operator_has_no_field() {
        let err = QueryError::unknown_operator("$where");
        assert!(err.field().is_none());
        assert!(err.message().contains("$where"));
    }
}
