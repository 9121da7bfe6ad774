//! # Stockview Core
//!
//! Schema discovery and dynamic table views for warehouse databases.
//!
//! The pipeline runs in this order:
//!
//! 1. [`SchemaDiscovery`] introspects the database (or reads the cached model)
//!    and infers a display formatter for every column.
//! 2. [`OverrideSet`] loads the YAML documents that take precedence over what
//!    was inferred.
//! 3. [`RouteTable`] maps a request path to each exposed table and custom
//!    view, and [`build_menu`] groups the tables for navigation.
//! 4. Per request, the query builder produces a bounded statement, runs it,
//!    and [`TableFormatter`] turns every cell into a [`RenderDescriptor`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use stockview_core::{CacheStore, Database, OverrideSet, SchemaDiscovery, Snapshot};
//!
//! let db = Database::builder().max_connections(5).connect(&url).await?;
//! let discovery = SchemaDiscovery::new(db.clone(), CacheStore::new("metadata")?);
//! let schema = discovery.scan(false).await?;
//! let snapshot = Snapshot::build(schema, OverrideSet::load("overrides"));
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod cache;
pub mod database;
pub mod discovery;
pub mod error;
pub mod formatter;
pub mod menu;
pub mod model;
pub mod overrides;
pub mod query_builder;
pub mod snapshot;
pub mod translation;
pub mod translation_check;
pub mod views;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use cache::CacheStore;
pub use database::{Connection, Database, DatabaseBuilder, Drivers, QueryResult, Statement};
pub use discovery::{infer_formatter, SchemaDiscovery};
pub use error::{CacheError, ConfigurationError, DiscoveryError, Error, QueryExecutionError};
pub use formatter::{format_value, FormattedRow, FormatterKind, RenderDescriptor, TableFormatter};
pub use menu::{build_menu, MenuCategory, MenuEntry};
pub use model::{ColumnMeta, Row, ScanInfo, SchemaModel, TableSchema};
pub use overrides::{ColumnOverride, GlobalConfig, OverrideSet, Params, TableOverride, ViewConfig};
pub use query_builder::{build_custom_query, build_table_query, QuerySpec};
pub use snapshot::{Snapshot, SnapshotCell};
pub use translation::TranslationManager;
pub use translation_check::TranslationChecker;
pub use views::{PageParams, RouteTable, RouteTarget};
