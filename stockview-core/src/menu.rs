//! # Menu Generator
//!
//! Groups tables into navigation categories by substrings of their upper-cased
//! name. Rules are checked in order and the first match wins.

use serde::Serialize;

use crate::{
    model::SchemaModel,
    overrides::OverrideSet,
    views::{configured_route, default_table_route, should_skip_table, RouteTable},
};

pub const DEFAULT_TABLE_ICON: &str = "📄";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ImportExport,
    Operations,
    MasterData,
    Reports,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::ImportExport,
        Category::Operations,
        Category::MasterData,
        Category::Reports,
        Category::Other,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Category::ImportExport => "import_export",
            Category::Operations => "operations",
            Category::MasterData => "master_data",
            Category::Reports => "reports",
            Category::Other => "other",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::ImportExport => "Import/Export Management",
            Category::Operations => "Operations & Execution",
            Category::MasterData => "Master Data",
            Category::Reports => "Reports & Analysis",
            Category::Other => "Other Tables",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::ImportExport => "📦",
            Category::Operations => "⚙️",
            Category::MasterData => "📋",
            Category::Reports => "📊",
            Category::Other => "📁",
        }
    }

    fn markers(&self) -> &'static [&'static str] {
        match self {
            Category::ImportExport => &["HOST_IMPORT", "HOST_EXPORT"],
            Category::Operations => &["RUN_", "EXEC", "OPERATION", "MISSION"],
            Category::MasterData => &["DAT_", "MAG_", "MASTER", "ARTICOL"],
            Category::Reports => &["REPORT", "FLOW", "CHECK", "STAT"],
            Category::Other => &[],
        }
    }
}

pub fn categorize(table_name: &str) -> Category {
    let name = table_name.to_uppercase();
    Category::ALL
        .into_iter()
        .find(|c| c.markers().iter().any(|m| name.contains(m)))
        .unwrap_or(Category::Other)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuEntry {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub route: String,
    pub icon: String,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuCategory {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub tables: Vec<MenuEntry>,
}

/// Navigation tree for every exposed table. Empty categories are left out.
///
/// When `routes` is given, each entry links to the path its table was actually
/// mounted at; otherwise the override route or the default one is used.
pub fn build_menu(
    schema: &SchemaModel,
    overrides: &OverrideSet,
    routes: Option<&RouteTable>,
) -> Vec<MenuCategory> {
    let mut categories: Vec<MenuCategory> = Category::ALL
        .iter()
        .map(|c| MenuCategory { key: c.key(), name: c.title(), icon: c.icon(), tables: Vec::new() })
        .collect();

    for name in schema.keys() {
        if should_skip_table(name, &overrides.global) {
            continue;
        }
        let config = overrides.table(name).cloned().unwrap_or_default();
        let route = match routes {
            Some(routes) => match routes.path_of_table(name) {
                Some(path) => path.to_string(),
                None => continue,
            },
            None => match config.route.as_deref() {
                Some(route) => configured_route(route),
                None => default_table_route(name),
            },
        };

        let entry = MenuEntry {
            name: name.clone(),
            display_name: config.display_name.unwrap_or_else(|| name.clone()),
            description: config.description.unwrap_or_default(),
            route,
            icon: config.icon.unwrap_or_else(|| DEFAULT_TABLE_ICON.to_string()),
            badges: config.badges,
        };

        let category = categorize(name);
        if let Some(slot) = categories.iter_mut().find(|c| c.key == category.key()) {
            slot.tables.push(entry);
        }
    }

    categories.retain(|c| !c.tables.is_empty());
    categories
}
