//! Parameter loading and validation
//!
//! The host runtime supplies named parameters, either in an args file (YAML
//! or JSON, optionally wrapped in `ANSIBLE_MODULE_ARGS`) or as command-line
//! flags. Both land in [`QueryParams`]; [`QueryParams::into_request`] is the
//! single validation pass that turns them into a [`QueryRequest`] before any
//! I/O happens.

use crate::core::extjson::{self, ExtJsonMode};
use crate::core::{ConnectionTarget, QueryError, QueryOutcome, QueryRequest, RawSort};
use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Key under which the host runtime wraps module parameters
pub const HOST_ARGS_KEY: &str = "ANSIBLE_MODULE_ARGS";

/// Non-negative integer accepted as a number or a numeric string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Count(pub u64);

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        let signed = match Raw::deserialize(deserializer)? {
            Raw::Unsigned(n) => return Ok(Count(n)),
            Raw::Signed(n) => n,
            Raw::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| D::Error::custom(format!("expected an integer, got '{}'", s)))?,
        };
        u64::try_from(signed)
            .map(Count)
            .map_err(|_| D::Error::custom(format!("expected a non-negative integer, got {}", signed)))
    }
}

/// Parameters as supplied by the host runtime
///
/// Values are kept as raw JSON until [`QueryParams::into_request`], so a
/// shape error names the parameter it came from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    /// Secret; defaults to `mongodb://localhost/`
    #[serde(default)]
    pub connection_string: Option<ConnectionTarget>,

    #[serde(default, alias = "db")]
    pub database: Option<Value>,

    #[serde(default)]
    pub collection: Option<Value>,

    /// Filter mapping in Extended JSON
    #[serde(default)]
    pub query: Option<Value>,

    /// Field inclusion/exclusion mapping
    #[serde(default)]
    pub projection: Option<Value>,

    /// Non-negative integer or integer string
    #[serde(default)]
    pub limit: Option<Value>,

    #[serde(default)]
    pub skip: Option<Value>,

    /// `[[field, direction], ...]`
    #[serde(default)]
    pub sort: Option<Value>,

    #[serde(default)]
    pub extjson_mode: Option<Value>,

    /// Everything else; host-private `_` keys are tolerated, the rest rejected
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Deserialize one parameter, reporting failures against its name
fn field<T: DeserializeOwned>(name: &str, value: Option<Value>) -> QueryOutcome<Option<T>> {
    value
        .filter(|v| !v.is_null())
        .map(|v| serde_json::from_value(v).map_err(|e| QueryError::invalid(name, e.to_string())))
        .transpose()
}

/// A decoded Extended JSON mapping
fn mapping(name: &str, value: Option<Value>) -> QueryOutcome<Option<bson::Document>> {
    match value.filter(|v| !v.is_null()) {
        None => Ok(None),
        Some(v @ Value::Object(_)) => extjson::decode_document(v)
            .map(Some)
            .map_err(|e| QueryError::invalid(name, e.to_string())),
        Some(_) => Err(QueryError::invalid(name, "expected a mapping")),
    }
}

/// `[[field, direction], ...]` with directions rendered as written
///
/// A direction that is not a string keeps its JSON literal (`1`, `true`) so
/// sort normalization rejects it by value.
fn sort_pairs(value: Option<Value>) -> QueryOutcome<Option<RawSort>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Value::Array(pairs) = value else {
        return Err(QueryError::invalid("sort", "expected a list of [field, direction] pairs"));
    };

    pairs
        .into_iter()
        .map(|pair| {
            let Value::Array(entries) = pair else {
                return Err(QueryError::invalid(
                    "sort",
                    format!("expected a [field, direction] pair, got {}", pair),
                ));
            };
            match <[Value; 2]>::try_from(entries) {
                Ok([Value::String(name), Value::String(token)]) => Ok((name, token)),
                Ok([Value::String(name), token]) => Ok((name, token.to_string())),
                Ok(_) => Err(QueryError::invalid("sort", "field names must be strings")),
                Err(entries) => Err(QueryError::invalid(
                    "sort",
                    format!("expected a [field, direction] pair, got {} entries", entries.len()),
                )),
            }
        })
        .collect::<QueryOutcome<RawSort>>()
        .map(Some)
}

impl QueryParams {
    /// Load parameters from a YAML or JSON file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read args file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("failed to parse args file {}", path.display()))
    }

    /// Load parameters from a YAML or JSON string
    ///
    /// Accepts the bare parameter mapping or the host wrapper
    /// `{"ANSIBLE_MODULE_ARGS": {...}}`.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        let value = match value {
            Value::Object(mut map) if map.len() == 1 && map.contains_key(HOST_ARGS_KEY) => map
                .remove(HOST_ARGS_KEY)
                .unwrap_or(Value::Object(Map::new())),
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Overlay `overrides` on top of `self`; set fields in `overrides` win
    pub fn merge(self, overrides: QueryParams) -> QueryParams {
        let mut extra = self.extra;
        extra.extend(overrides.extra);
        QueryParams {
            connection_string: overrides.connection_string.or(self.connection_string),
            database: overrides.database.or(self.database),
            collection: overrides.collection.or(self.collection),
            query: overrides.query.or(self.query),
            projection: overrides.projection.or(self.projection),
            limit: overrides.limit.or(self.limit),
            skip: overrides.skip.or(self.skip),
            sort: overrides.sort.or(self.sort),
            extjson_mode: overrides.extjson_mode.or(self.extjson_mode),
            extra,
        }
    }

    /// True when the host asked for a dry run; the query is read-only and runs anyway
    pub fn check_mode(&self) -> bool {
        matches!(self.extra.get("_ansible_check_mode"), Some(Value::Bool(true)))
    }

    /// Output mode, relaxed unless requested otherwise
    pub fn mode(&self) -> QueryOutcome<ExtJsonMode> {
        Ok(field("extjson_mode", self.extjson_mode.clone())?.unwrap_or_default())
    }

    /// Validate everything and build the request; performs no I/O
    pub fn into_request(self) -> QueryOutcome<QueryRequest> {
        let database = field::<String>("database", self.database)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| QueryError::missing("database"))?;
        let collection = field::<String>("collection", self.collection)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| QueryError::missing("collection"))?;

        if let Some(unknown) = self.extra.keys().find(|k| !k.starts_with('_')) {
            return Err(QueryError::invalid(
                unknown.clone(),
                "unsupported parameter",
            ));
        }

        let filter = mapping("query", self.query)?.unwrap_or_default();
        let projection = mapping("projection", self.projection)?;
        let skip = field::<Count>("skip", self.skip)?.unwrap_or_default();
        let limit = field::<Count>("limit", self.limit)?.unwrap_or_default();
        let sort = sort_pairs(self.sort)?;

        Ok(QueryRequest {
            connection: self.connection_string.unwrap_or_default(),
            database,
            collection,
            filter,
            projection,
            skip: skip.0,
            limit: limit.0,
            sort,
        })
    }
}
