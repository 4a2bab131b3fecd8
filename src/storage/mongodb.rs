//! MongoDB backend using the official MongoDB async driver.
//!
//! Provides `MongoConnector`, which opens a `mongodb::Client` from the
//! caller's connection string, and `MongoFindService`, which runs one find
//! and drains the cursor.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag (enabled by
//! default). A build without it reports `DependencyMissing` at startup.
//!
//! # Connection semantics
//!
//! `Client::with_uri_str` only parses the URI and resolves SRV records; it
//! does not contact a server. The connector therefore issues a `ping`
//! against `admin` so that unreachable hosts and authentication failures
//! surface as `ConnectionError` before the find runs.

use crate::core::{
    ConnectionTarget, Connector, FindService, FindSpec, QueryError, QueryOutcome, SortSpec,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::FindOptions;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// True for failures to reach or authenticate against the deployment
fn is_connection_failure(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
    )
}

fn connection_error(err: mongodb::error::Error) -> QueryError {
    QueryError::ConnectionError {
        message: err.to_string(),
    }
}

/// Map a failure raised while the find runs
fn find_error(err: mongodb::error::Error) -> QueryError {
    if is_connection_failure(&err) {
        connection_error(err)
    } else {
        QueryError::OperationError {
            message: err.to_string(),
        }
    }
}

/// Translate a validated spec into driver options
///
/// Zero skip and zero limit are left unset so the server applies no bound.
fn build_find_options(spec: &FindSpec) -> QueryOutcome<FindOptions> {
    let mut options = FindOptions::default();
    options.projection = spec.projection.clone();
    options.sort = spec.sort.as_ref().map(SortSpec::to_document);
    if spec.skip > 0 {
        options.skip = Some(spec.skip);
    }
    if spec.limit > 0 {
        let limit = i64::try_from(spec.limit)
            .map_err(|_| QueryError::invalid("limit", "value exceeds the server's range"))?;
        options.limit = Some(limit);
    }
    Ok(options)
}

// ---------------------------------------------------------------------------
// MongoConnector
// ---------------------------------------------------------------------------

/// Connector backed by the MongoDB driver
///
/// # Example
///
/// ```rust,ignore
/// use mongodb_query::prelude::*;
/// use std::sync::Arc;
///
/// let executor = QueryExecutor::new(Arc::new(MongoConnector::new()));
/// let request = QueryRequest::new("local", "startup_log")
///     .with_connection(ConnectionTarget::new("mongodb://db1:27017/"));
/// let result = executor.execute(&request).await?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, target: &ConnectionTarget) -> QueryOutcome<Box<dyn FindService>> {
        let client = Client::with_uri_str(target.expose())
            .await
            .map_err(connection_error)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        tracing::debug!("connected to deployment");

        Ok(Box::new(MongoFindService::new(client)))
    }
}

// ---------------------------------------------------------------------------
// MongoFindService
// ---------------------------------------------------------------------------

/// Find service over an open `mongodb::Client`
#[derive(Clone, Debug)]
pub struct MongoFindService {
    client: Client,
}

impl MongoFindService {
    /// Create a find service from an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, spec: &FindSpec) -> mongodb::Collection<Document> {
        self.client
            .database(&spec.namespace.database)
            .collection(&spec.namespace.collection)
    }
}

#[async_trait]
impl FindService for MongoFindService {
    async fn find(&self, spec: &FindSpec) -> QueryOutcome<Vec<Document>> {
        let options = build_find_options(spec)?;

        let cursor = self
            .collection(spec)
            .find(spec.filter.clone())
            .with_options(options)
            .await
            .map_err(find_error)?;

        cursor.try_collect().await.map_err(find_error)
    }
}
