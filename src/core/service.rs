//! Service traits between the executor and a database driver

use crate::core::connection::ConnectionTarget;
use crate::core::error::QueryOutcome;
use crate::core::query::FindSpec;
use async_trait::async_trait;
use bson::Document;

/// Opens a session against a connection target
///
/// Implementations map every failure to reach the database (bad URI,
/// unreachable host, authentication) to
/// [`QueryError::ConnectionError`](crate::core::error::QueryError::ConnectionError).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a connection; may block on network I/O
    async fn connect(&self, target: &ConnectionTarget) -> QueryOutcome<Box<dyn FindService>>;
}

/// Executes a single find against an open connection
#[async_trait]
pub trait FindService: Send + Sync {
    /// Run the find and buffer the whole cursor
    ///
    /// Filter, projection, skip, limit and sort are applied in one query.
    /// Server-side failures map to
    /// [`QueryError::OperationError`](crate::core::error::QueryError::OperationError).
    async fn find(&self, spec: &FindSpec) -> QueryOutcome<Vec<Document>>;
}
