//! # mongodb-query
//!
//! A read-only MongoDB query plugin for configuration-management runtimes.
//! One invocation issues one `find` and returns the matching documents as an
//! Extended JSON envelope: `{"changed": false, "result": [...]}`.
//!
//! ## Features
//!
//! - **Typed parameters**: host arguments are validated in one pass before any I/O
//! - **Fail-fast sort validation**: `ASCENDING` / `DESCENDING`, case-insensitive
//! - **Single query**: filter, projection, skip, limit and sort applied together
//! - **Lossless output**: ObjectIds, dates, binary and decimals survive as tagged Extended JSON
//! - **Secret-safe**: the connection string is redacted from every log and error
//! - **Pluggable backends**: the MongoDB driver, or in-memory fixtures for tests and dry runs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mongodb_query::prelude::*;
//! use std::sync::Arc;
//!
//! let executor = QueryExecutor::new(Arc::new(MongoConnector::new()));
//! let request = QueryRequest::new("accounts", "software")
//!     .with_filter(doc! { "os": "linux" })
//!     .with_projection(doc! { "name": true, "_id": false })
//!     .with_skip(4)
//!     .with_limit(3)
//!     .with_sort([("name", "ASCENDING"), ("version", "DESCENDING")]);
//!
//! let result = executor.execute(&request).await?;
//! println!("{}", result.to_extjson_string(ExtJsonMode::Relaxed));
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod executor;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ConnectionTarget, Connector, ExtJsonMode, FindService, FindSpec, Namespace, QueryError,
        QueryOutcome, QueryRequest, QueryResult, SortDirection, SortSpec, normalize_sort,
    };

    // === Codec ===
    pub use crate::core::extjson::{decode, decode_document, encode, encode_document};

    // === Config ===
    pub use crate::config::QueryParams;

    // === Execution ===
    pub use crate::executor::QueryExecutor;

    // === Storage ===
    pub use crate::storage::InMemoryConnector;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoConnector;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use bson::{Bson, Document, doc};
}
