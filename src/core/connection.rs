//! Connection target handling
//!
//! The connection string carries hosts, credentials and the auth database.
//! It is handed to the driver untouched and never printed: both `Debug` and
//! `Display` are redacted so it cannot leak through `tracing` fields or
//! error messages.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// Default target used when the host runtime supplies none
pub const DEFAULT_CONNECTION_STRING: &str = "mongodb://localhost/";

/// Opaque, secret connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget(String);

impl ConnectionTarget {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Expose the raw URI. Only the driver should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_STRING)
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionTarget(<redacted>)")
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<'de> Deserialize<'de> for ConnectionTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ConnectionTarget)
    }
}
