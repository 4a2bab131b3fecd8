//! In-memory implementation of the find backend for testing and dry runs
//!
//! Collections are plain `Vec<Document>`s kept in insertion order, which is
//! the "storage order" returned when no sort is given. A find applies filter,
//! sort, skip, limit and projection in the same order the server does.

mod compare;
mod filter;
mod projection;

use crate::core::extjson;
use crate::core::{
    ConnectionTarget, Connector, FindService, FindSpec, QueryError, QueryOutcome, SortDirection,
    SortSpec,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bson::{Bson, Document};
use compare::compare_sort_keys;
use projection::Projection;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

type Collections = HashMap<(String, String), Vec<Document>>;

fn lock_error(e: impl std::fmt::Display) -> QueryError {
    QueryError::OperationError {
        message: format!("Failed to acquire collection lock: {}", e),
    }
}

/// In-memory connector
///
/// Clones share the same collections and the same connection counter, so a
/// test can hand one clone to a [`QueryExecutor`](crate::executor::QueryExecutor)
/// and inspect the other.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    collections: Arc<RwLock<Collections>>,
    attempts: Arc<AtomicUsize>,
    unreachable: bool,
}

impl InMemoryConnector {
    /// Create an empty in-memory deployment
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InMemoryConnector::insert_many`]
    pub fn with_collection(
        self,
        database: &str,
        collection: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> Self {
        self.insert_many(database, collection, documents);
        self
    }

    /// Make every connection attempt fail, as if no server were reachable
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Append documents to a collection, creating it if needed
    pub fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: impl IntoIterator<Item = Document>,
    ) {
        // a poisoned lock only means a panicking test; keep its data
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .extend(documents);
    }

    /// Load fixtures from an Extended JSON (or YAML) file
    ///
    /// The file maps database names to collection names to document arrays:
    /// `{"local": {"startup_log": [{...}, ...]}}`.
    pub fn from_fixture_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture file {}", path.display()))?;
        Self::from_fixture_str(&content)
            .with_context(|| format!("invalid fixture file {}", path.display()))
    }

    /// Load fixtures from an Extended JSON (or YAML) string
    pub fn from_fixture_str(content: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_yaml::from_str(content)?;
        let serde_json::Value::Object(databases) = value else {
            return Err(anyhow!("fixtures must map database names to collections"));
        };

        let connector = Self::new();
        for (database, collections) in databases {
            let serde_json::Value::Object(collections) = collections else {
                return Err(anyhow!("database '{}' must map collection names to arrays", database));
            };
            for (collection, documents) in collections {
                let serde_json::Value::Array(documents) = documents else {
                    return Err(anyhow!("collection '{}.{}' must be an array", database, collection));
                };
                let documents = documents
                    .into_iter()
                    .map(extjson::decode_document)
                    .collect::<Result<Vec<_>, _>>()?;
                connector.insert_many(&database, &collection, documents);
            }
        }
        Ok(connector)
    }

    /// Number of times `connect` has been called on this connector or its clones
    pub fn connection_attempts(&self) -> usize {
        self.attempts.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, _target: &ConnectionTarget) -> QueryOutcome<Box<dyn FindService>> {
        self.attempts.fetch_add(1, AtomicOrdering::SeqCst);
        if self.unreachable {
            return Err(QueryError::ConnectionError {
                message: "No servers available for the in-memory deployment".to_string(),
            });
        }
        Ok(Box::new(InMemoryFindService {
            collections: self.collections.clone(),
        }))
    }
}

/// Find service over the shared in-memory collections
pub struct InMemoryFindService {
    collections: Arc<RwLock<Collections>>,
}

#[async_trait]
impl FindService for InMemoryFindService {
    async fn find(&self, spec: &FindSpec) -> QueryOutcome<Vec<Document>> {
        let projection = spec
            .projection
            .as_ref()
            .map(Projection::compile)
            .transpose()?;

        let collections = self.collections.read().map_err(lock_error)?;
        let key = (
            spec.namespace.database.clone(),
            spec.namespace.collection.clone(),
        );
        // a missing collection reads as empty
        let stored = collections.get(&key).map(Vec::as_slice).unwrap_or_default();

        let mut matched = Vec::new();
        for doc in stored {
            if filter::matches(doc, &spec.filter)? {
                matched.push(doc);
            }
        }

        if let Some(sort) = &spec.sort {
            sort_documents(&mut matched, sort);
        }

        let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
        let limit = match spec.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &projection {
                Some(projection) => projection.apply(doc),
                None => doc.clone(),
            })
            .collect())
    }
}

/// Stable multi-key sort; ties keep storage order
fn sort_documents(documents: &mut [&Document], sort: &SortSpec) {
    documents.sort_by(|a, b| {
        for (field, direction) in sort.keys() {
            let ka = sort_key(a, field, *direction);
            let kb = sort_key(b, field, *direction);
            let ord = match direction {
                SortDirection::Ascending => compare_sort_keys(&ka, &kb),
                SortDirection::Descending => compare_sort_keys(&kb, &ka),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Key of an empty array; sorts below null
static EMPTY_ARRAY_KEY: Bson = Bson::Undefined;

/// Arrays sort by their smallest element ascending and largest descending;
/// a missing field sorts as null
fn sort_key(doc: &Document, field: &str, direction: SortDirection) -> Bson {
    let mut candidates: Vec<&Bson> = Vec::new();
    for value in filter::resolve_path(doc, field) {
        match value {
            Bson::Array(items) if items.is_empty() => candidates.push(&EMPTY_ARRAY_KEY),
            Bson::Array(items) => candidates.extend(items.iter()),
            other => candidates.push(other),
        }
    }

    let pick = match direction {
        SortDirection::Ascending => candidates
            .into_iter()
            .min_by(|a, b| compare_sort_keys(a, b)),
        SortDirection::Descending => candidates
            .into_iter()
            .max_by(|a, b| compare_sort_keys(a, b)),
    };
    pick.cloned().unwrap_or(Bson::Null)
}
