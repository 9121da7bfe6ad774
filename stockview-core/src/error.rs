//! # Error Types
//!
//! Failures are grouped by how far they are allowed to travel: per-table
//! discovery and cache failures are contained where they happen, query failures
//! are surfaced to the requesting endpoint, and configuration failures reject a
//! single route at registration time.

use thiserror::Error;

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Query(#[from] QueryExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Introspection of a single table failed.
#[derive(Debug, Error)]
#[error("Failed to introspect table {table}: {source}")]
pub struct DiscoveryError {
    pub table: String,
    #[source]
    pub source: sqlx::Error,
}

/// Reading or writing a cache document failed.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache document {key} is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A statement failed against the database. Carries the driver message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Query execution failed: {0}")]
pub struct QueryExecutionError(pub String);

impl From<sqlx::Error> for QueryExecutionError {
    fn from(error: sqlx::Error) -> Self {
        QueryExecutionError(error.to_string())
    }
}

/// A custom view definition is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown query_type: {0}")]
    UnknownQueryType(String),

    #[error("query_type {query_type} requires `{field}`")]
    MissingField { query_type: &'static str, field: &'static str },

    #[error("Route {0} is already registered")]
    RouteConflict(String),
}
