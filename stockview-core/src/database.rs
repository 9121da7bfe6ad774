//! # Database Module
//!
//! Connection pooling, driver detection, catalog introspection and statement
//! execution across PostgreSQL, MySQL and SQLite. Everything above this module
//! talks to the database through the [`Connection`] trait, so discovery and
//! query execution can run against any implementation of it.

// ============================================================================
// External Crate Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    any::{AnyArguments, AnyPoolOptions, AnyRow},
    AnyPool, Arguments, Column, Row as _,
};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    model::{ForeignKeyMeta, IndexMeta, Row},
    Error,
};

// ============================================================================
// Database Driver Enum
// ============================================================================

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drivers {
    /// PostgreSQL driver
    Postgres,
    /// MySQL driver
    MySQL,
    /// SQLite driver
    SQLite,
}

impl Drivers {
    /// Detects the driver from a connection URL scheme.
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres") {
            Drivers::Postgres
        } else if url.starts_with("mysql") || url.starts_with("mariadb") {
            Drivers::MySQL
        } else {
            Drivers::SQLite
        }
    }

    /// Quotes an identifier for this dialect.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Drivers::MySQL => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Positional placeholder for the `n`-th (1-based) bound parameter.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Drivers::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    /// Whether the Any driver can decode a column of this declared type as it
    /// is stored. `sql_type` is the catalog spelling reported by
    /// [`Connection::table_columns`].
    pub fn decodes_natively(&self, sql_type: &str) -> bool {
        let ty = sql_type.trim().to_lowercase();
        match self {
            // mirrors sqlx-sqlite's declared type mapping; bool and temporal
            // types and anything it cannot parse are rejected
            Drivers::SQLite => match ty.as_str() {
                "" => true,
                "boolean" | "bool" | "date" | "time" | "datetime" | "timestamp" => false,
                t => ["int", "char", "clob", "text", "blob", "real", "floa", "doub"]
                    .iter()
                    .any(|m| t.contains(m)),
            },
            Drivers::Postgres => matches!(
                ty.as_str(),
                "boolean"
                    | "smallint"
                    | "integer"
                    | "bigint"
                    | "real"
                    | "double precision"
                    | "bytea"
                    | "text"
                    | "character varying"
            ),
            Drivers::MySQL => {
                let base = ty.split(['(', ' ']).next().unwrap_or_default();
                let unsigned = ty.contains("unsigned");
                match base {
                    "smallint" | "int" | "integer" | "bigint" => !unsigned,
                    "float" | "double" | "varchar" | "char" => true,
                    "text" | "tinytext" | "mediumtext" | "longtext" => true,
                    "blob" | "tinyblob" | "mediumblob" | "longblob" => true,
                    _ => false,
                }
            }
        }
    }

    /// Select-list expression for a column. Types the Any driver cannot decode
    /// are read as text under their own name.
    pub fn select_column(&self, name: &str, sql_type: &str) -> String {
        let quoted = self.quote(name);
        if self.decodes_natively(sql_type) {
            return quoted;
        }
        let text_type = match self {
            Drivers::MySQL => "CHAR",
            _ => "TEXT",
        };
        format!("CAST({} AS {}) AS {}", quoted, text_type, quoted)
    }
}

// ============================================================================
// Statements and Results
// ============================================================================

/// A statement ready to run: SQL text plus positional bind values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), binds: Vec::new() }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.binds.push(value.into());
        self
    }
}

/// Normalized result of any statement: ordered column names plus row maps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Builds a result from driver rows. Column names come from the first row.
    pub fn from_rows(rows: &[AnyRow]) -> Self {
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        Self { columns, rows: rows.iter().map(decode_row).collect() }
    }
}

/// Column facts as reported by the catalog, before any inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub autoincrement: bool,
}

// ============================================================================
// Connection Trait
// ============================================================================

/// The database as seen by discovery and the query builder.
#[async_trait]
pub trait Connection: Send + Sync {
    fn driver(&self) -> Drivers;
    async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error>;
    async fn table_columns(&self, table: &str) -> Result<Vec<RawColumn>, sqlx::Error>;
    async fn primary_keys(&self, table: &str) -> Result<Vec<String>, sqlx::Error>;
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>, sqlx::Error>;
    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>, sqlx::Error>;
    async fn fetch(&self, statement: &Statement) -> Result<QueryResult, sqlx::Error>;
}

// ============================================================================
// Database Struct
// ============================================================================

/// Pooled connection to the dashboard database.
///
/// Cloning is cheap; the pool is shared. Each statement checks a connection out
/// of the pool and hands it back when the call returns, whether it succeeded or not.
#[derive(Debug, Clone)]
pub struct Database {
    /// The underlying SQLx connection pool
    pub(crate) pool: AnyPool,
    /// The detected database driver
    pub(crate) driver: Drivers,
}

impl Database {
    /// Creates a new DatabaseBuilder for configuring the connection.
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Connects to a database using the provided connection string.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        DatabaseBuilder::new().connect(url).await
    }

    /// Runs a statement that returns no rows (DDL, seeding).
    pub async fn execute(&self, statement: &Statement) -> Result<u64, Error> {
        let result = sqlx::query_with(&statement.sql, build_arguments(&statement.binds))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch_catalog(
        &self,
        sql: &str,
        table: Option<&str>,
    ) -> Result<Vec<AnyRow>, sqlx::Error> {
        match table {
            Some(table) => sqlx::query(sql).bind(table.to_string()).fetch_all(&self.pool).await,
            None => sqlx::query(sql).fetch_all(&self.pool).await,
        }
    }
}

#[async_trait]
impl Connection for Database {
    fn driver(&self) -> Drivers {
        self.driver
    }

    async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        let query = match self.driver {
            Drivers::Postgres => {
                "SELECT table_name::TEXT FROM information_schema.tables WHERE table_schema = \
                 'public' AND table_type = 'BASE TABLE' ORDER BY table_name"
            }
            Drivers::MySQL => {
                "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = \
                 DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            }
            Drivers::SQLite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE \
                 'sqlite_%' ORDER BY name"
            }
        };

        let rows = self.fetch_catalog(query, None).await?;
        Ok(rows.iter().map(|r| text(r, 0)).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<RawColumn>, sqlx::Error> {
        if let Drivers::SQLite = self.driver {
            let query = format!("PRAGMA table_info({})", self.driver.quote(table));
            let rows = self.fetch_catalog(&query, None).await?;
            let pk_count = rows.iter().filter(|r| int(r, 5) > 0).count();

            // cid, name, type, notnull, dflt_value, pk
            return Ok(rows
                .iter()
                .map(|r| {
                    let sql_type = text(r, 2);
                    let rowid_alias =
                        pk_count == 1 && int(r, 5) > 0 && sql_type.eq_ignore_ascii_case("INTEGER");
                    RawColumn {
                        name: text(r, 1),
                        sql_type,
                        nullable: int(r, 3) == 0 && int(r, 5) == 0,
                        default: opt_text(r, 4),
                        autoincrement: rowid_alias,
                    }
                })
                .collect());
        }

        let query = match self.driver {
            Drivers::Postgres => {
                "SELECT column_name::TEXT, data_type::TEXT, is_nullable::TEXT, \
                 column_default::TEXT, is_identity::TEXT FROM information_schema.columns WHERE \
                 table_name = $1 AND table_schema = 'public' ORDER BY ordinal_position"
            }
            _ => {
                "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA FROM \
                 information_schema.COLUMNS WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE() \
                 ORDER BY ORDINAL_POSITION"
            }
        };

        let rows = self.fetch_catalog(query, Some(table)).await?;
        Ok(rows
            .iter()
            .map(|r| {
                let default = opt_text(r, 3);
                let extra = text(r, 4);
                let autoincrement = extra.eq_ignore_ascii_case("YES")
                    || extra.to_lowercase().contains("auto_increment")
                    || default.as_deref().is_some_and(|d| d.starts_with("nextval("));
                RawColumn {
                    name: text(r, 0),
                    sql_type: text(r, 1),
                    nullable: text(r, 2).eq_ignore_ascii_case("YES"),
                    default,
                    autoincrement,
                }
            })
            .collect())
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>, sqlx::Error> {
        if let Drivers::SQLite = self.driver {
            let query = format!("PRAGMA table_info({})", self.driver.quote(table));
            let rows = self.fetch_catalog(&query, None).await?;
            let mut keys: Vec<(i64, String)> =
                rows.iter().filter(|r| int(r, 5) > 0).map(|r| (int(r, 5), text(r, 1))).collect();
            keys.sort_by_key(|(position, _)| *position);
            return Ok(keys.into_iter().map(|(_, name)| name).collect());
        }

        let query = match self.driver {
            Drivers::Postgres => {
                "SELECT kcu.column_name::TEXT FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu ON tc.constraint_name = \
                 kcu.constraint_name AND tc.table_schema = kcu.table_schema AND tc.table_name \
                 = kcu.table_name WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = \
                 $1 AND tc.table_schema = 'public' ORDER BY kcu.ordinal_position"
            }
            _ => {
                "SELECT COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE WHERE TABLE_NAME \
                 = ? AND TABLE_SCHEMA = DATABASE() AND CONSTRAINT_NAME = 'PRIMARY' ORDER BY \
                 ORDINAL_POSITION"
            }
        };

        let rows = self.fetch_catalog(query, Some(table)).await?;
        Ok(rows.iter().map(|r| text(r, 0)).collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>, sqlx::Error> {
        let rows = match self.driver {
            // id, seq, table, from, to, ...
            Drivers::SQLite => {
                let query = format!("PRAGMA foreign_key_list({})", self.driver.quote(table));
                let rows = self.fetch_catalog(&query, None).await?;
                return Ok(rows
                    .iter()
                    .map(|r| ForeignKeyMeta {
                        column: text(r, 3),
                        referenced_table: text(r, 2),
                        referenced_column: text(r, 4),
                    })
                    .collect());
            }
            Drivers::Postgres => {
                let query = "SELECT kcu.column_name::TEXT, ccu.table_name::TEXT, \
                             ccu.column_name::TEXT FROM information_schema.table_constraints \
                             tc JOIN information_schema.key_column_usage kcu ON \
                             tc.constraint_name = kcu.constraint_name AND tc.table_schema = \
                             kcu.table_schema JOIN information_schema.constraint_column_usage \
                             ccu ON ccu.constraint_name = tc.constraint_name AND \
                             ccu.table_schema = tc.table_schema WHERE tc.constraint_type = \
                             'FOREIGN KEY' AND tc.table_name = $1 AND tc.table_schema = \
                             'public' ORDER BY kcu.ordinal_position";
                self.fetch_catalog(query, Some(table)).await?
            }
            Drivers::MySQL => {
                let query = "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
                             FROM information_schema.KEY_COLUMN_USAGE WHERE TABLE_NAME = ? AND \
                             TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL \
                             ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION";
                self.fetch_catalog(query, Some(table)).await?
            }
        };

        Ok(rows
            .iter()
            .map(|r| ForeignKeyMeta {
                column: text(r, 0),
                referenced_table: text(r, 1),
                referenced_column: text(r, 2),
            })
            .collect())
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>, sqlx::Error> {
        // (index name, column name, unique), ordered by index then position
        let mut entries: Vec<(String, String, bool)> = Vec::new();

        match self.driver {
            Drivers::SQLite => {
                let query = format!("PRAGMA index_list({})", self.driver.quote(table));
                // seq, name, unique, origin, partial
                for index_row in self.fetch_catalog(&query, None).await? {
                    let index_name = text(&index_row, 1);
                    let unique = int(&index_row, 2) != 0;
                    let info_query =
                        format!("PRAGMA index_info({})", self.driver.quote(&index_name));
                    // seqno, cid, name
                    for col_row in self.fetch_catalog(&info_query, None).await? {
                        entries.push((index_name.clone(), text(&col_row, 2), unique));
                    }
                }
            }
            Drivers::Postgres => {
                let query = "SELECT i.relname::TEXT, a.attname::TEXT, ix.indisunique FROM \
                             pg_class t JOIN pg_index ix ON t.oid = ix.indrelid JOIN pg_class \
                             i ON i.oid = ix.indexrelid JOIN pg_attribute a ON a.attrelid = \
                             t.oid AND a.attnum = ANY(ix.indkey) WHERE t.relname = $1 AND \
                             t.relkind = 'r' ORDER BY i.relname, a.attnum";
                for r in self.fetch_catalog(query, Some(table)).await? {
                    let unique = matches!(decode_value(&r, 2), Value::Bool(true));
                    entries.push((text(&r, 0), text(&r, 1), unique));
                }
            }
            Drivers::MySQL => {
                let query = "SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE FROM \
                             information_schema.STATISTICS WHERE TABLE_NAME = ? AND \
                             TABLE_SCHEMA = DATABASE() ORDER BY INDEX_NAME, SEQ_IN_INDEX";
                for r in self.fetch_catalog(query, Some(table)).await? {
                    entries.push((text(&r, 0), text(&r, 1), int(&r, 2) == 0));
                }
            }
        }

        Ok(group_indexes(entries))
    }

    async fn fetch(&self, statement: &Statement) -> Result<QueryResult, sqlx::Error> {
        let rows = sqlx::query_with(&statement.sql, build_arguments(&statement.binds))
            .fetch_all(&self.pool)
            .await?;
        Ok(QueryResult::from_rows(&rows))
    }
}

// ============================================================================
// DatabaseBuilder Struct
// ============================================================================

pub struct DatabaseBuilder {
    max_connections: u32,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self { max_connections: 5 }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub async fn connect(self, url: &str) -> Result<Database, Error> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(self.max_connections).connect(url).await?;
        Ok(Database { pool, driver: Drivers::from_url(url) })
    }
}

// ============================================================================
// Row Decoding
// ============================================================================

/// Converts a driver row into an ordered column -> JSON value map.
pub fn decode_row(row: &AnyRow) -> Row {
    let mut map = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_value(row, idx));
    }
    map
}

/// Decodes one cell by trying the Any driver's value kinds in turn.
fn decode_value(row: &AnyRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|b| Value::from(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}

fn opt_text(row: &AnyRow, idx: usize) -> Option<String> {
    match decode_value(row, idx) {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn text(row: &AnyRow, idx: usize) -> String {
    opt_text(row, idx).unwrap_or_default()
}

fn int(row: &AnyRow, idx: usize) -> i64 {
    match decode_value(row, idx) {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::Bool(b) => b as i64,
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn build_arguments(binds: &[Value]) -> AnyArguments<'_> {
    let mut args = AnyArguments::default();
    for value in binds {
        let _ = match value {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(b) => args.add(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => args.add(i),
                None => args.add(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => args.add(s.clone()),
            other => args.add(other.to_string()),
        };
    }
    args
}

fn group_indexes(entries: Vec<(String, String, bool)>) -> Vec<IndexMeta> {
    let mut indexes: Vec<IndexMeta> = Vec::new();
    for (name, column, unique) in entries {
        match indexes.iter_mut().find(|i| i.name == name) {
            Some(index) => index.columns.push(column),
            None => indexes.push(IndexMeta { name, columns: vec![column], unique }),
        }
    }
    indexes
}
