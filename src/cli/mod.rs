//! Command-line surface of the `mongodb_query` binary
//!
//! The host runtime invokes the binary with the path of an args file;
//! individual flags override values from that file. On success exactly one
//! line is written to stdout: the result envelope. On failure exactly one
//! line is written instead: a [`FailureResponse`](crate::core::FailureResponse).
//! Logs go to stderr.

use crate::config::QueryParams;
use crate::core::{ConnectionTarget, Connector, ExtJsonMode, QueryError, QueryOutcome};
use crate::executor::QueryExecutor;
use crate::storage::{self, InMemoryConnector};
use clap::Parser;
use clap::error::ErrorKind;
use serde_json::Value;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run a read-only MongoDB find and print the result as Extended JSON
#[derive(Parser, Debug, Default)]
#[command(name = "mongodb_query")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Parameter file (YAML or JSON) supplied by the host runtime
    #[arg(value_name = "ARGS_FILE")]
    pub args_file: Option<PathBuf>,

    /// Connection string; never logged. Falls back to `MONGODB_URI`
    #[arg(long)]
    pub connection_string: Option<String>,

    /// Database to query
    #[arg(long, visible_alias = "db")]
    pub database: Option<String>,

    /// Collection to query
    #[arg(long)]
    pub collection: Option<String>,

    /// Filter document, as Extended JSON
    #[arg(long, value_name = "JSON")]
    pub query: Option<String>,

    /// Projection document, as JSON
    #[arg(long, value_name = "JSON")]
    pub projection: Option<String>,

    /// Maximum number of documents (0 = no limit)
    #[arg(long, allow_hyphen_values = true)]
    pub limit: Option<String>,

    /// Number of documents to skip
    #[arg(long, allow_hyphen_values = true)]
    pub skip: Option<String>,

    /// Sort keys, e.g. '[["name", "ASCENDING"], ["version", "DESCENDING"]]'
    #[arg(long, value_name = "JSON")]
    pub sort: Option<String>,

    /// Extended JSON flavour of the output
    #[arg(long, value_enum)]
    pub extjson_mode: Option<ExtJsonMode>,

    /// Serve the query from a fixture file instead of a live deployment
    #[arg(long, value_name = "FILE")]
    pub fixtures: Option<PathBuf>,
}

/// Environment fallback for the connection string
pub const CONNECTION_ENV: &str = "MONGODB_URI";

fn json_flag(field: &str, raw: Option<&str>) -> QueryOutcome<Option<Value>> {
    raw.map(|text| {
            serde_json::from_str(text).map_err(|e| QueryError::invalid(field, e.to_string()))
        })
        .transpose()
}

impl Cli {
    /// Flag values as parameters, validated through the same deserializer as args files
    pub fn to_params(&self) -> QueryOutcome<QueryParams> {
        let mut map = serde_json::Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };

        put(
            "connection_string",
            self.connection_string.clone().map(Value::String),
        );
        put("database", self.database.clone().map(Value::String));
        put("collection", self.collection.clone().map(Value::String));
        put("query", json_flag("query", self.query.as_deref())?);
        put("projection", json_flag("projection", self.projection.as_deref())?);
        put("limit", self.limit.clone().map(Value::String));
        put("skip", self.skip.clone().map(Value::String));
        put("sort", json_flag("sort", self.sort.as_deref())?);
        put(
            "extjson_mode",
            self.extjson_mode.map(serde_json::to_value).transpose()?,
        );

        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Args file (if any) overlaid with flags
    pub fn load_params(&self) -> QueryOutcome<QueryParams> {
        let base = match &self.args_file {
            Some(path) => QueryParams::from_yaml_file(path)?,
            None => QueryParams::default(),
        };
        let mut params = base.merge(self.to_params()?);
        if params.connection_string.is_none()
            && let Ok(uri) = std::env::var(CONNECTION_ENV)
        {
            params.connection_string = Some(ConnectionTarget::new(uri));
        }
        Ok(params)
    }

    /// Backend for this invocation; checked before parameters are parsed
    pub fn connector(&self) -> QueryOutcome<Arc<dyn Connector>> {
        match &self.fixtures {
            Some(path) => Ok(Arc::new(InMemoryConnector::from_fixture_file(path)?)),
            None => storage::driver_connector(),
        }
    }
}

/// Install the stderr subscriber; `RUST_LOG` overrides the default `warn`
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Execute one invocation and return the line to print on success
pub async fn run(cli: &Cli) -> QueryOutcome<String> {
    let connector = cli.connector()?;
    run_with(cli, connector).await
}

/// [`run`] against an explicit backend
pub async fn run_with(cli: &Cli, connector: Arc<dyn Connector>) -> QueryOutcome<String> {
    let params = cli.load_params()?;
    if params.check_mode() {
        tracing::debug!("check mode requested; running the read-only query unchanged");
    }
    let mode = params.mode()?;
    let request = params.into_request()?;

    let result = QueryExecutor::new(connector).execute(&request).await?;
    Ok(result.to_extjson_string(mode))
}

/// Line printed on stdout for a failed invocation
pub fn failure_line(err: &QueryError) -> String {
    serde_json::to_string(&err.to_response())
        .unwrap_or_else(|e| serde_json::json!({ "failed": true, "msg": e.to_string() }).to_string())
}

/// Parse flags; help and version output are not failures
///
/// Any other clap error becomes an [`QueryError::InvalidParameter`], so a bad
/// flag is reported through the same failure line as a bad args file.
pub fn parse_args<I, T>(args: I) -> Result<Cli, ParseOutcome>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ParseOutcome::Exit(err),
        _ => ParseOutcome::Failed(err.into()),
    })
}

/// Why [`parse_args`] did not produce a [`Cli`]
#[derive(Debug)]
pub enum ParseOutcome {
    /// clap rendered help or version text; print it and exit
    Exit(clap::Error),
    /// The flags are invalid
    Failed(QueryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse_with_db_alias() {
        let cli = Cli::try_parse_from([
            "mongodb_query",
            "--db",
            "local",
            "--collection",
            "startup_log",
            "--limit",
            "3",
        ])
        .unwrap();

        let request = cli.to_params().unwrap().into_request().unwrap();
        assert_eq!(request.database, "local");
        assert_eq!(request.limit, 3);
    }

    #[test]
    fn test_invalid_json_flag() {
        let cli = Cli {
            query: Some("{not json".to_string()),
            ..Default::default()
        };
        let err = cli.to_params().unwrap_err();
        assert!(matches!(err, QueryError::InvalidParameter { ref field, .. } if field == "query"));
    }

    #[test]
    fn test_negative_limit_flag_is_invalid_parameter() {
        let cli =
            Cli::try_parse_from(["mongodb_query", "--db", "a", "--collection", "b", "--limit", "-1"])
                .unwrap();
        let err = cli.to_params().unwrap().into_request().unwrap_err();
        assert!(matches!(err, QueryError::InvalidParameter { ref field, .. } if field == "limit"));
    }

    #[test]
    fn test_failure_line_shape() {
        let line = failure_line(&QueryError::missing("database"));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["failed"], true);
        assert_eq!(value["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_bad_flag_value_is_a_parameter_failure() {
        let outcome = parse_args(["mongodb_query", "--db", "a", "--extjson-mode", "bogus"]);
        let err = match outcome {
            Err(ParseOutcome::Failed(err)) => err,
            other => panic!("expected a parameter failure, got {other:?}"),
        };

        assert_eq!(err.exit_code(), 1);
        let value: Value = serde_json::from_str(&failure_line(&err)).unwrap();
        assert_eq!(value["failed"], true);
        assert_eq!(value["code"], "INVALID_PARAMETER");
        assert!(value["msg"].as_str().unwrap().contains("bogus"));
    }

    #[test]
    fn test_unknown_flag_is_a_parameter_failure() {
        let outcome = parse_args(["mongodb_query", "--hint", "pid_1"]);
        assert!(matches!(outcome, Err(ParseOutcome::Failed(ref err)) if err.exit_code() == 1));
    }

    #[test]
    fn test_help_is_not_a_failure() {
        let outcome = parse_args(["mongodb_query", "--help"]);
        assert!(matches!(outcome, Err(ParseOutcome::Exit(_))));
    }
}
