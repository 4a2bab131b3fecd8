//! Typed error handling for mongodb-query
//!
//! Every failure a query invocation can hit is one variant of [`QueryError`].
//! Errors are terminal: the executor never retries, and the CLI reports each
//! error exactly once through a [`FailureResponse`] on stdout.
//!
//! # Error Categories
//!
//! - Validation, detected before any I/O:
//!   [`QueryError::MissingRequiredField`], [`QueryError::InvalidSortDirection`],
//!   [`QueryError::InvalidParameter`]
//! - Runtime, detected while talking to the database:
//!   [`QueryError::ConnectionError`], [`QueryError::OperationError`]
//! - Environment, detected at startup: [`QueryError::DependencyMissing`]
//!
//! # Example
//!
//! ```rust,ignore
//! match executor.execute(&request).await {
//!     Ok(result) => println!("{}", result.to_extjson_string(ExtJsonMode::Relaxed)),
//!     Err(QueryError::InvalidSortDirection { token }) => {
//!         eprintln!("bad sort token: {token}");
//!     }
//!     Err(e) => eprintln!("query failed: {e}"),
//! }
//! ```

use serde::Serialize;

/// The error type for every query invocation
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A required identifying parameter (database, collection) is absent or empty
    #[error("missing required arguments: {field}")]
    MissingRequiredField { field: String },

    /// A sort direction token is neither ASCENDING nor DESCENDING
    #[error("Invalid Sort parameter [{token}]. It must be either ASCENDING or DESCENDING")]
    InvalidSortDirection { token: String },

    /// A parameter is present but has the wrong shape or type
    #[error("invalid value for parameter '{field}': {message}")]
    InvalidParameter { field: String, message: String },

    /// Transport, DNS, server selection or authentication failure
    #[error("unable to connect to database: {message}")]
    ConnectionError { message: String },

    /// The server rejected or failed the find itself
    #[error("query failed: {message}")]
    OperationError { message: String },

    /// The database driver is not available in this build
    #[error("the {dependency} driver is required but this build does not include it")]
    DependencyMissing { dependency: String },
}

/// Failure payload reported to the host runtime
///
/// Mirrors the runtime's own failure shape (`failed` + `msg`) and adds a
/// machine-readable `code`.
#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub failed: bool,
    pub msg: String,
    pub code: String,
}

impl QueryError {
    pub fn missing(field: impl Into<String>) -> Self {
        QueryError::MissingRequiredField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::MissingRequiredField { .. } => "MISSING_REQUIRED_FIELD",
            QueryError::InvalidSortDirection { .. } => "INVALID_SORT_DIRECTION",
            QueryError::InvalidParameter { .. } => "INVALID_PARAMETER",
            QueryError::ConnectionError { .. } => "CONNECTION_ERROR",
            QueryError::OperationError { .. } => "OPERATION_ERROR",
            QueryError::DependencyMissing { .. } => "DEPENDENCY_MISSING",
        }
    }

    /// Process exit code reported to the host runtime
    pub fn exit_code(&self) -> u8 {
        match self {
            QueryError::MissingRequiredField { .. }
            | QueryError::InvalidSortDirection { .. }
            | QueryError::InvalidParameter { .. } => 1,
            QueryError::ConnectionError { .. } => 2,
            QueryError::OperationError { .. } => 3,
            QueryError::DependencyMissing { .. } => 4,
        }
    }

    /// True for errors raised before any network I/O
    pub fn is_validation(&self) -> bool {
        self.exit_code() == 1
    }

    /// Convert to a failure response
    pub fn to_response(&self) -> FailureResponse {
        FailureResponse {
            failed: true,
            msg: self.to_string(),
            code: self.error_code().to_string(),
        }
    }
}

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<serde_yaml::Error> for QueryError {
    fn from(err: serde_yaml::Error) -> Self {
        QueryError::invalid("args", err.to_string())
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::invalid("args", err.to_string())
    }
}

/// Flag parsing; only the first line of clap's report is kept
impl From<clap::Error> for QueryError {
    fn from(err: clap::Error) -> Self {
        let rendered = err.to_string();
        let message = rendered
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches("error: ");
        QueryError::invalid("flags", message)
    }
}

/// Args-file loading reports through `anyhow`; a typed error inside is kept
impl From<anyhow::Error> for QueryError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<QueryError>() {
            Ok(query_err) => query_err,
            Err(other) => QueryError::invalid("args", format!("{:#}", other)),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for query operations
pub type QueryOutcome<T> = Result<T, QueryError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sort_direction_display_carries_token() {
        let err = QueryError::InvalidSortDirection {
            token: "upwards".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid Sort parameter [upwards]. It must be either ASCENDING or DESCENDING"
        );
    }

    #[test]
    fn test_connection_error_display() {
        let err = QueryError::ConnectionError {
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().starts_with("unable to connect to database"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_exit_codes_are_non_zero() {
        let errors = [
            QueryError::missing("database"),
            QueryError::InvalidSortDirection {
                token: "x".to_string(),
            },
            QueryError::invalid("skip", "negative"),
            QueryError::ConnectionError {
                message: "x".to_string(),
            },
            QueryError::OperationError {
                message: "x".to_string(),
            },
            QueryError::DependencyMissing {
                dependency: "mongodb".to_string(),
            },
        ];
        for err in &errors {
            assert_ne!(err.exit_code(), 0, "{err}");
        }
    }

    #[test]
    fn test_validation_classification() {
        assert!(QueryError::missing("collection").is_validation());
        assert!(
            !QueryError::OperationError {
                message: "x".to_string()
            }
            .is_validation()
        );
    }

    #[test]
    fn test_failure_response_serialization() {
        let response = QueryError::missing("database").to_response();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["failed"], true);
        assert_eq!(json["code"], "MISSING_REQUIRED_FIELD");
        assert!(json["msg"].as_str().unwrap().contains("database"));
    }

    #[test]
    fn test_from_clap_error_is_single_line() {
        use clap::Parser;

        #[derive(Parser, Debug)]
        struct Flags {
            #[arg(long)]
            limit: u32,
        }

        let err: QueryError = Flags::try_parse_from(["prog", "--limit", "many"])
            .unwrap_err()
            .into();

        assert_eq!(err.exit_code(), 1);
        assert!(!err.to_string().contains('\n'));
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_from_anyhow_keeps_typed_error() {
        let err: anyhow::Error = QueryError::missing("collection").into();
        let back: QueryError = err.into();
        assert!(matches!(back, QueryError::MissingRequiredField { .. }));
    }

    #[test]
    fn test_from_anyhow_wraps_foreign_error() {
        let err = anyhow::anyhow!("file not found");
        let back: QueryError = err.into();
        assert_eq!(back.error_code(), "INVALID_PARAMETER");
        assert!(back.to_string().contains("file not found"));
    }
}
