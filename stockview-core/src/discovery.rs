//! # Schema Discovery
//!
//! Builds a [`SchemaModel`] from the live database, or from the on-disk cache
//! when a recent one exists. A table that fails to introspect is logged and
//! left out; the scan itself carries on.

use std::time::Duration;

use crate::{
    cache::CacheStore,
    database::Connection,
    error::{CacheError, DiscoveryError},
    formatter::FormatterKind,
    model::{ColumnMeta, ScanInfo, SchemaModel, TableSchema},
    query_builder::TableQuery,
    Error,
};

pub const SCHEMA_CACHE_KEY: &str = "db_schema";
pub const SCAN_INFO_KEY: &str = "last_scan";

/// A cached model younger than this is reused unless a scan is forced.
pub const SCHEMA_MAX_AGE: Duration = Duration::from_secs(3600);

/// Rows sampled per table for inference.
pub const SAMPLE_ROWS: usize = 5;

const CODE_MARKERS: [&str; 2] = ["SSCC", "UDC"];

/// Infers a display formatter from a column's name and declared type.
///
/// Name rules run before type rules, first match wins:
/// 1. STATUS / STATE -> `status_badge`
/// 2. XML / JSON -> `expandable_code`
/// 3. DATE / TIME / TIMESTAMP -> `datetime`
/// 4. ends with ID -> `monospace_id`
/// 5. SSCC / UDC -> `monospace_code`
/// 6. datetime/timestamp, integer, decimal, boolean types
/// 7. `text`
pub fn infer_formatter(column_name: &str, sql_type: &str) -> FormatterKind {
    let name = column_name.to_uppercase();
    let ty = sql_type.to_lowercase();

    if name.contains("STATUS") || name.contains("STATE") {
        return FormatterKind::StatusBadge;
    }
    if name.contains("XML") || name.contains("JSON") {
        return FormatterKind::ExpandableCode;
    }
    if ["DATE", "TIME", "TIMESTAMP"].iter().any(|m| name.contains(m)) {
        return FormatterKind::Datetime;
    }
    if name.ends_with("ID") {
        return FormatterKind::MonospaceId;
    }
    if CODE_MARKERS.iter().any(|m| name.contains(m)) {
        return FormatterKind::MonospaceCode;
    }

    if ty.contains("datetime") || ty.contains("timestamp") {
        return FormatterKind::Datetime;
    }
    if ty.contains("int") && !ty.contains("interval") && !ty.contains("point") {
        return FormatterKind::Number;
    }
    if ["decimal", "numeric", "float", "double", "real"].iter().any(|m| ty.contains(m)) {
        return FormatterKind::Decimal;
    }
    if ty.contains("bit") || ty.contains("bool") {
        return FormatterKind::Boolean;
    }
    FormatterKind::Text
}

pub struct SchemaDiscovery<C> {
    conn: C,
    cache: CacheStore,
}

impl<C: Connection> SchemaDiscovery<C> {
    pub fn new(conn: C, cache: CacheStore) -> Self {
        Self { conn, cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Returns the schema model, from cache when allowed and fresh, otherwise
    /// by scanning the database and persisting the result.
    ///
    /// Only a failure to enumerate tables is an error; single-table failures
    /// are excluded from the model.
    pub async fn scan(&self, force: bool) -> Result<SchemaModel, Error> {
        if !force && self.cache.is_valid(SCHEMA_CACHE_KEY, SCHEMA_MAX_AGE) {
            match self.load_cached_schema() {
                Ok(Some(model)) => {
                    log::info!("Using cached schema (less than 1 hour old)");
                    return Ok(model);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Ignoring unreadable schema cache: {}", e),
            }
        }

        log::info!("Starting database scan...");
        let table_names = self.conn.list_tables().await?;
        log::info!("Found {} tables", table_names.len());

        let mut model = SchemaModel::new();
        for table in table_names {
            match self.extract_table(&table).await {
                Ok(schema) => {
                    log::debug!("Scanned {}", table);
                    model.insert(table, schema);
                }
                Err(e) => log::error!("{}", e),
            }
        }

        if let Err(e) = self.persist(&model) {
            log::error!("Could not persist schema cache: {}", e);
        }

        log::info!("Database scan completed: {} tables processed", model.len());
        Ok(model)
    }

    /// Introspects one table.
    pub async fn extract_table(&self, table: &str) -> Result<TableSchema, DiscoveryError> {
        let wrap = |source| DiscoveryError { table: table.to_string(), source };

        let columns: Vec<ColumnMeta> = self
            .conn
            .table_columns(table)
            .await
            .map_err(wrap)?
            .into_iter()
            .map(|raw| ColumnMeta {
                suggested_formatter: infer_formatter(&raw.name, &raw.sql_type),
                name: raw.name,
                sql_type: raw.sql_type,
                nullable: raw.nullable,
                default: raw.default,
                autoincrement: raw.autoincrement,
            })
            .collect();

        let primary_keys = self.conn.primary_keys(table).await.map_err(wrap)?;
        let foreign_keys = self.conn.foreign_keys(table).await.map_err(wrap)?;
        let indexes = self.conn.indexes(table).await.map_err(wrap)?;

        let sample = TableQuery {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            column_types: columns.iter().map(|c| (c.name.clone(), c.sql_type.clone())).collect(),
            filters: Vec::new(),
            order_by: None,
            limit: SAMPLE_ROWS,
        }
        .to_statement(self.conn.driver());
        let sample_data = match self.conn.fetch(&sample).await {
            Ok(result) => result.rows,
            Err(e) => {
                log::warn!("Could not get sample data for {}: {}", table, e);
                Vec::new()
            }
        };

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            primary_keys,
            foreign_keys,
            indexes,
            sample_data,
        })
    }

    fn persist(&self, model: &SchemaModel) -> Result<(), CacheError> {
        self.cache.save(SCHEMA_CACHE_KEY, model)?;
        self.cache.save(SCAN_INFO_KEY, &ScanInfo::for_model(model))?;
        log::info!("Schema saved to {}", self.cache.path_for(SCHEMA_CACHE_KEY).display());
        Ok(())
    }

    pub fn load_cached_schema(&self) -> Result<Option<SchemaModel>, CacheError> {
        self.cache.load(SCHEMA_CACHE_KEY)
    }

    pub fn get_table_info(&self, table: &str) -> Option<TableSchema> {
        self.load_cached_schema().ok().flatten()?.remove(table)
    }

    pub fn get_scan_info(&self) -> Option<ScanInfo> {
        self.cache.load(SCAN_INFO_KEY).ok().flatten()
    }
}
