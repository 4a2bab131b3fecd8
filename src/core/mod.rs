//! Core module containing the request model, codec and service traits

pub mod connection;
pub mod error;
pub mod extjson;
pub mod query;
pub mod service;
pub mod sort;

pub use connection::{ConnectionTarget, DEFAULT_CONNECTION_STRING};
pub use error::{FailureResponse, QueryError, QueryOutcome};
pub use extjson::{ExtJsonError, ExtJsonMode};
pub use query::{FindSpec, Namespace, QueryRequest, QueryResult};
pub use service::{Connector, FindService};
pub use sort::{RawSort, SortDirection, SortSpec, normalize_sort};
