//! # Override Loader
//!
//! Reads user-supplied YAML documents that take precedence over everything
//! discovery infers:
//!
//! ```text
//! overrides/
//! ├── global.yaml          skip_tables, install-wide status colors
//! ├── tables/<TABLE>.yaml  per-table route, columns, limit, filters, ordering
//! └── views/<VIEW>.yaml    custom query / stored procedure / template views
//! ```
//!
//! The file stem is the table or view name. A document that cannot be read or
//! parsed is logged and left out; it never prevents the rest from loading.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::formatter::FormatterKind;

/// Ordered parameter map, as written in the document.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Per-column display settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOverride {
    /// Formatter to use instead of the inferred one.
    pub formatter: Option<FormatterKind>,
    /// Extra status -> color entries for `status_badge` columns.
    pub status_colors: BTreeMap<String, String>,
    /// Fraction digits for `decimal` columns.
    pub decimals: Option<usize>,
    /// Truncation length for `text` columns.
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOverride {
    pub route: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub badges: Vec<String>,
    /// When present, exactly these columns are selected.
    pub show_columns: Option<Vec<String>>,
    pub hide_columns: Vec<String>,
    pub default_limit: Option<usize>,
    /// Raw predicates, ANDed together.
    pub filters: Vec<String>,
    /// Raw ORDER BY clause, e.g. `DATA_INS DESC`.
    pub order_by: Option<String>,
    pub columns: HashMap<String, ColumnOverride>,
}

/// Definition of a custom, non table-backed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub route: Option<String>,
    /// One of `sql`, `stored_procedure`, `template`. Checked at registration.
    pub query_type: String,
    pub query: Option<String>,
    pub procedure: Option<String>,
    pub query_template: Option<String>,
    pub parameters: Params,
    pub column_overrides: Option<HashMap<String, ColumnOverride>>,
    pub template: Option<String>,
    pub display_name: Option<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            route: None,
            query_type: "sql".to_string(),
            query: None,
            procedure: None,
            query_template: None,
            parameters: Params::new(),
            column_overrides: None,
            template: None,
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Tables never exposed, by exact name.
    pub skip_tables: Vec<String>,
    /// Install-wide status colors, below per-column ones.
    pub status_colors: BTreeMap<String, String>,
}

/// Everything loaded from the overrides directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSet {
    pub tables: BTreeMap<String, TableOverride>,
    pub views: BTreeMap<String, ViewConfig>,
    pub global: GlobalConfig,
}

impl OverrideSet {
    /// Loads `tables/`, `views/` and `global.yaml` from `dir`. A missing
    /// directory yields an empty set.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();

        let tables = load_documents::<TableOverride>(&dir.join("tables"));
        for name in tables.keys() {
            log::debug!("Loaded override for table: {}", name);
        }

        let views = load_documents::<ViewConfig>(&dir.join("views"));
        for name in views.keys() {
            log::debug!("Loaded custom view: {}", name);
        }

        let global = ["global.yaml", "global.yml"]
            .iter()
            .map(|f| dir.join(f))
            .find(|p| p.is_file())
            .and_then(|p| read_document::<GlobalConfig>(&p))
            .unwrap_or_default();

        Self { tables, views, global }
    }

    pub fn table(&self, name: &str) -> Option<&TableOverride> {
        self.tables.get(name)
    }
}

fn load_documents<T: DeserializeOwned + Default>(dir: &Path) -> BTreeMap<String, T> {
    let mut documents = BTreeMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return documents;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let extension = path.extension().and_then(|e| e.to_str());
        let is_yaml = extension.is_some_and(|e| e == "yaml" || e == "yml");
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_yaml {
            continue;
        }
        if let Some(document) = read_document::<T>(&path) {
            documents.insert(stem.to_string(), document);
        }
    }
    documents
}

fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Cannot read override {}: {}", path.display(), e);
            return None;
        }
    };
    if content.trim().is_empty() {
        return Some(T::default());
    }
    match serde_yaml::from_str(&content) {
        Ok(document) => Some(document),
        Err(e) => {
            log::error!("Invalid override {}: {}", path.display(), e);
            None
        }
    }
}
