//! Query request and result envelope

use crate::core::connection::ConnectionTarget;
use crate::core::error::{QueryError, QueryOutcome};
use crate::core::extjson::{self, ExtJsonMode};
use crate::core::sort::{RawSort, SortSpec, normalize_sort};
use bson::Document;
use serde_json::{Value, json};
use std::fmt;

/// `database.collection` pair targeted by a find
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// One read-only find invocation, built once from the caller's parameters
///
/// `sort` holds the raw `[field, direction]` tokens; they are normalized by
/// the executor before any connection is attempted.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub connection: ConnectionTarget,
    pub database: String,
    pub collection: String,
    pub filter: Document,
    pub projection: Option<Document>,
    pub skip: u64,
    /// 0 means unbounded
    pub limit: u64,
    pub sort: Option<RawSort>,
}

impl QueryRequest {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn with_connection(mut self, connection: ConnectionTarget) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort<F, D>(mut self, keys: impl IntoIterator<Item = (F, D)>) -> Self
    where
        F: Into<String>,
        D: Into<String>,
    {
        self.sort = Some(
            keys.into_iter()
                .map(|(field, direction)| (field.into(), direction.into()))
                .collect(),
        );
        self
    }

    /// Check identifying fields and normalize sort; performs no I/O
    pub fn validate(&self) -> QueryOutcome<FindSpec> {
        if self.database.is_empty() {
            return Err(QueryError::missing("database"));
        }
        if self.collection.is_empty() {
            return Err(QueryError::missing("collection"));
        }

        let sort = normalize_sort(self.sort.as_deref())?.filter(|spec| !spec.is_empty());

        Ok(FindSpec {
            namespace: Namespace::new(&self.database, &self.collection),
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            skip: self.skip,
            limit: self.limit,
            sort,
        })
    }
}

/// Validated find parameters handed to a [`FindService`](crate::core::service::FindService)
///
/// All five query parameters are applied together in one find.
#[derive(Debug, Clone, PartialEq)]
pub struct FindSpec {
    pub namespace: Namespace,
    pub filter: Document,
    pub projection: Option<Document>,
    pub skip: u64,
    /// 0 means unbounded
    pub limit: u64,
    pub sort: Option<SortSpec>,
}

/// Result envelope of a successful query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Always false: the query never modifies data
    pub changed: bool,
    pub result: Vec<Document>,
}

impl QueryResult {
    pub fn new(result: Vec<Document>) -> Self {
        Self {
            changed: false,
            result,
        }
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    /// Envelope as an Extended JSON value
    pub fn to_extjson(&self, mode: ExtJsonMode) -> Value {
        let documents: Vec<Value> = self
            .result
            .iter()
            .map(|doc| extjson::encode_document(doc, mode))
            .collect();
        json!({
            "changed": self.changed,
            "result": documents,
        })
    }

    /// Envelope serialized on a single line
    pub fn to_extjson_string(&self, mode: ExtJsonMode) -> String {
        self.to_extjson(mode).to_string()
    }

    /// Parse an envelope produced by [`QueryResult::to_extjson`]
    pub fn from_extjson(value: Value) -> QueryOutcome<Self> {
        let Value::Object(mut map) = value else {
            return Err(QueryError::invalid("result", "envelope must be an object"));
        };

        let changed = map
            .get("changed")
            .and_then(Value::as_bool)
            .ok_or_else(|| QueryError::invalid("changed", "expected a boolean"))?;

        let Some(Value::Array(items)) = map.remove("result") else {
            return Err(QueryError::invalid("result", "expected an array"));
        };

        let result = items
            .into_iter()
            .map(extjson::decode_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| QueryError::invalid("result", e.to_string()))?;

        Ok(Self { changed, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sort::SortDirection;
    use bson::doc;

    #[test]
    fn test_request_defaults() {
        let request = QueryRequest::new("local", "startup_log");
        assert_eq!(request.connection.expose(), "mongodb://localhost/");
        assert!(request.filter.is_empty());
        assert!(request.projection.is_none());
        assert_eq!(request.skip, 0);
        assert_eq!(request.limit, 0);
        assert!(request.sort.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_database() {
        let err = QueryRequest::new("", "c").validate().unwrap_err();
        assert!(matches!(err, QueryError::MissingRequiredField { ref field } if field == "database"));
    }

    #[test]
    fn test_validate_rejects_empty_collection() {
        let err = QueryRequest::new("db", "").validate().unwrap_err();
        assert!(matches!(err, QueryError::MissingRequiredField { ref field } if field == "collection"));
    }

    #[test]
    fn test_missing_field_checked_before_sort() {
        let err = QueryRequest::new("", "c")
            .with_sort([("a", "sideways")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, QueryError::MissingRequiredField { .. }));
    }

    #[test]
    fn test_validate_builds_find_spec() {
        let spec = QueryRequest::new("accounts", "software")
            .with_filter(doc! { "os": "linux" })
            .with_projection(doc! { "name": true, "_id": false })
            .with_skip(4)
            .with_limit(3)
            .with_sort([("name", "ASCENDING"), ("version", "descending")])
            .validate()
            .unwrap();

        assert_eq!(spec.namespace.to_string(), "accounts.software");
        assert_eq!(spec.skip, 4);
        assert_eq!(spec.limit, 3);
        let sort = spec.sort.unwrap();
        assert_eq!(sort.keys()[1], ("version".to_string(), SortDirection::Descending));
    }

    #[test]
    fn test_empty_sort_list_means_no_sort() {
        let spec = QueryRequest::new("db", "c")
            .with_sort(Vec::<(String, String)>::new())
            .validate()
            .unwrap();
        assert!(spec.sort.is_none());
    }

    #[test]
    fn test_envelope_shape() {
        let result = QueryResult::new(vec![doc! { "a": 1 }]);
        let value = result.to_extjson(ExtJsonMode::Relaxed);

        assert_eq!(value["changed"], false);
        assert_eq!(value["result"][0]["a"], 1);
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["changed", "result"]);
    }

    #[test]
    fn test_empty_envelope() {
        let result = QueryResult::new(vec![]);
        assert_eq!(
            result.to_extjson_string(ExtJsonMode::Relaxed),
            r#"{"changed":false,"result":[]}"#
        );
    }
}
