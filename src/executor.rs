//! Single-shot query execution
//!
//! [`QueryExecutor`] turns a [`QueryRequest`] into a [`QueryResult`]:
//!
//! 1. validate `database` / `collection` and normalize sort (no I/O),
//! 2. connect through the configured [`Connector`],
//! 3. run one find and buffer the full cursor,
//! 4. wrap the documents in a `changed: false` envelope.
//!
//! Every failure is terminal; nothing is retried.

use crate::core::{Connector, QueryOutcome, QueryRequest, QueryResult};
use std::sync::Arc;

/// Executes read-only find requests through a [`Connector`]
#[derive(Clone)]
pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
}

impl QueryExecutor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    pub async fn execute(&self, request: &QueryRequest) -> QueryOutcome<QueryResult> {
        let spec = request.validate()?;

        tracing::debug!(
            namespace = %spec.namespace,
            skip = spec.skip,
            limit = spec.limit,
            sorted = spec.sort.is_some(),
            projected = spec.projection.is_some(),
            "executing find"
        );

        let service = self.connector.connect(&request.connection).await?;
        let documents = service.find(&spec).await?;

        tracing::info!(
            namespace = %spec.namespace,
            documents = documents.len(),
            "query complete"
        );

        Ok(QueryResult::new(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConnectionTarget, FindService, FindSpec, QueryError};
    use async_trait::async_trait;
    use bson::{Document, doc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingConnector;

    #[async_trait]
    impl Connector for FailingConnector {
        async fn connect(&self, _target: &ConnectionTarget) -> QueryOutcome<Box<dyn FindService>> {
            Err(QueryError::ConnectionError {
                message: "no reachable servers".to_string(),
            })
        }
    }

    struct EchoService;

    #[async_trait]
    impl FindService for EchoService {
        async fn find(&self, spec: &FindSpec) -> QueryOutcome<Vec<Document>> {
            Ok(vec![doc! { "ns": spec.namespace.to_string() }])
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, _target: &ConnectionTarget) -> QueryOutcome<Box<dyn FindService>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoService))
        }
    }

    #[tokio::test]
    async fn connection_failure_is_propagated() {
        let executor = QueryExecutor::new(Arc::new(FailingConnector));
        let err = executor
            .execute(&QueryRequest::new("db", "c"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_ERROR");
    }

    #[tokio::test]
    async fn connects_exactly_once() {
        let connector = Arc::new(CountingConnector::default());
        let executor = QueryExecutor::new(connector.clone());

        let result = executor
            .execute(&QueryRequest::new("db", "c"))
            .await
            .unwrap();

        assert!(!result.changed);
        assert_eq!(result.result, vec![doc! { "ns": "db.c" }]);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_sort_never_connects() {
        let connector = Arc::new(CountingConnector::default());
        let executor = QueryExecutor::new(connector.clone());

        let request = QueryRequest::new("db", "c").with_sort([("name", "up")]);
        let err = executor.execute(&request).await.unwrap_err();

        assert!(matches!(err, QueryError::InvalidSortDirection { .. }));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }
}
