//! Storage implementations for different backends

pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;

pub use self::in_memory::{InMemoryConnector, InMemoryFindService};
#[cfg(feature = "mongodb_backend")]
pub use self::mongodb::{MongoConnector, MongoFindService};

use crate::core::{Connector, QueryOutcome};
use std::sync::Arc;

/// Driver-backed connector for this build
///
/// Fails with `DependencyMissing` when the crate was built without the
/// `mongodb_backend` feature.
pub fn driver_connector() -> QueryOutcome<Arc<dyn Connector>> {
    #[cfg(feature = "mongodb_backend")]
    {
        Ok(Arc::new(MongoConnector::new()))
    }
    #[cfg(not(feature = "mongodb_backend"))]
    {
        Err(crate::core::QueryError::DependencyMissing {
            dependency: "mongodb".to_string(),
        })
    }
}
