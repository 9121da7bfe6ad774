use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::formatter::FormatterKind;

/// A single result row: column name -> raw value, in projection order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Metadata information about a discovered column.
///
/// `suggested_formatter` is always filled by inference during discovery and is
/// a pure function of `name` and `sql_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// The column name in the database.
    pub name: String,
    /// The declared SQL type as reported by the catalog (e.g. "INTEGER", "varchar(50)").
    pub sql_type: String,
    /// Whether this column allows NULL values.
    pub nullable: bool,
    /// The default expression, if any.
    pub default: Option<String>,
    /// Whether the database generates values for this column.
    pub autoincrement: bool,
    /// Display hint inferred from name and type.
    pub suggested_formatter: FormatterKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyMeta {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Structural model of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Columns in catalog order, which is also the default display order.
    pub columns: Vec<ColumnMeta>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
    pub indexes: Vec<IndexMeta>,
    /// A handful of rows used for inference only. Never displayed.
    #[serde(default)]
    pub sample_data: Vec<Row>,
}

impl TableSchema {
    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Table name -> structural model. Rebuilt wholesale on every scan.
pub type SchemaModel = BTreeMap<String, TableSchema>;

/// Summary written next to the schema cache after a successful scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub tables_count: usize,
    pub total_columns: usize,
}

impl ScanInfo {
    pub fn for_model(model: &SchemaModel) -> Self {
        Self {
            timestamp: chrono::Local::now(),
            tables_count: model.len(),
            total_columns: model.values().map(|t| t.columns.len()).sum(),
        }
    }
}
