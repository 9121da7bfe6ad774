//! # View / Route Generator
//!
//! Every exposed table and every custom view becomes one entry in a
//! [`RouteTable`]: a plain map from request path to what should be rendered
//! there. A single generic handler resolves the path and calls
//! [`render_table`] or [`render_custom`], so nothing is generated per table.

// ============================================================================
// External Crate Imports
// ============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    database::Connection,
    error::{ConfigurationError, QueryExecutionError},
    formatter::{FormattedRow, TableFormatter},
    model::{Row, SchemaModel, TableSchema},
    overrides::{GlobalConfig, OverrideSet, Params, TableOverride, ViewConfig},
    query_builder::{
        self, build_custom_query, build_table_query, QuerySpec, QueryType, DEFAULT_LIMIT,
    },
    Error,
};

/// Table name prefixes that are never exposed. Case-sensitive.
pub const SYSTEM_PREFIXES: [&str; 4] = ["sys", "INFORMATION_SCHEMA", "temp", "tmp"];

pub const TABLE_TEMPLATE: &str = "table.html";
pub const CUSTOM_VIEW_TEMPLATE: &str = "custom_view.html";

/// Whether a table is hidden by the system prefixes or the global blacklist.
pub fn should_skip_table(name: &str, global: &GlobalConfig) -> bool {
    SYSTEM_PREFIXES.iter().any(|p| name.starts_with(p))
        || global.skip_tables.iter().any(|t| t == name)
}

/// `/table/<lowercased name>`.
pub fn default_table_route(name: &str) -> String {
    format!("/table/{}", name.to_lowercase())
}

/// Strips a trailing slash, except on the root path.
pub fn normalize_path(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// Mount path for a configured `route`: always absolute, no trailing slash.
pub fn configured_route(route: &str) -> String {
    let route = route.trim();
    let path = if route.starts_with('/') { route.to_string() } else { format!("/{}", route) };
    normalize_path(&path).to_string()
}

// ============================================================================
// Route Targets
// ============================================================================

#[derive(Debug, Clone)]
pub struct TableRoute {
    pub endpoint_id: String,
    pub name: String,
    pub schema: TableSchema,
    pub config: TableOverride,
}

#[derive(Debug, Clone)]
pub struct CustomRoute {
    pub endpoint_id: String,
    pub name: String,
    pub query_type: QueryType,
    pub config: ViewConfig,
}

#[derive(Debug, Clone)]
pub enum RouteTarget {
    Table(TableRoute),
    Custom(CustomRoute),
}

impl RouteTarget {
    pub fn endpoint_id(&self) -> &str {
        match self {
            RouteTarget::Table(t) => &t.endpoint_id,
            RouteTarget::Custom(c) => &c.endpoint_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RouteTarget::Table(t) => &t.name,
            RouteTarget::Custom(c) => &c.name,
        }
    }
}

// ============================================================================
// Route Table
// ============================================================================

/// Path -> target mapping built once per snapshot.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, RouteTarget>,
    endpoints: HashSet<String>,
    status_colors: BTreeMap<String, String>,
}

impl RouteTable {
    /// An empty table. `status_colors` are the install-wide badge colors used
    /// when formatting every route's cells.
    pub fn new(status_colors: BTreeMap<String, String>) -> Self {
        Self { status_colors, ..Default::default() }
    }

    /// Builds the full table: every exposed table, then every custom view.
    pub fn build(schema: &SchemaModel, overrides: &OverrideSet) -> Self {
        let mut routes = Self::new(overrides.global.status_colors.clone());
        routes.register_all_tables(schema, overrides);
        for (name, view) in &overrides.views {
            if let Err(e) = routes.register_custom_view(name, view) {
                log::error!("Custom view {} not registered: {}", name, e);
            }
        }
        routes
    }

    /// Registers one route per table that is not skipped. Returns how many
    /// were registered.
    pub fn register_all_tables(&mut self, schema: &SchemaModel, overrides: &OverrideSet) -> usize {
        log::info!("Registering dynamic routes for all tables...");
        let mut registered = 0;

        for (name, table) in schema {
            if should_skip_table(name, &overrides.global) {
                log::debug!("Skipping table {}", name);
                continue;
            }
            let config = overrides.table(name).cloned().unwrap_or_default();
            if let Some(path) = self.register_table(name, table, config) {
                log::debug!("Registered route for {} at {}", name, path);
                registered += 1;
            }
        }

        log::info!("Registered {} dynamic table routes", registered);
        registered
    }

    /// Registers a single table and returns the path it was mounted at.
    ///
    /// An explicit `route` that is already taken is an error. A default route
    /// that collides (two tables differing only by case) falls back to the
    /// exact-case name.
    pub fn register_table(
        &mut self,
        name: &str,
        schema: &TableSchema,
        config: TableOverride,
    ) -> Option<String> {
        let path = match &config.route {
            Some(route) => {
                let route = configured_route(route);
                if self.routes.contains_key(&route) {
                    let error = ConfigurationError::RouteConflict(route);
                    log::error!("Error registering {}: {}", name, error);
                    return None;
                }
                route
            }
            None => {
                let lowered = default_table_route(name);
                let exact = format!("/table/{}", name);
                if !self.routes.contains_key(&lowered) {
                    lowered
                } else if !self.routes.contains_key(&exact) {
                    exact
                } else {
                    let error = ConfigurationError::RouteConflict(lowered);
                    log::error!("Error registering {}: {}", name, error);
                    return None;
                }
            }
        };

        let endpoint_id = self.unique_endpoint(format!("table_view_{}", name.to_lowercase()));
        let target =
            TableRoute { endpoint_id, name: name.to_string(), schema: schema.clone(), config };
        self.routes.insert(path.clone(), RouteTarget::Table(target));
        Some(path)
    }

    /// Registers a custom view. Fails when the view's query type is unknown,
    /// its required field is missing, or its route is taken.
    pub fn register_custom_view(
        &mut self,
        name: &str,
        config: &ViewConfig,
    ) -> Result<String, ConfigurationError> {
        let query_type = validate_view(config)?;
        let path = match &config.route {
            Some(route) => configured_route(route),
            None => format!("/{}", name),
        };
        if self.routes.contains_key(&path) {
            return Err(ConfigurationError::RouteConflict(path));
        }

        let endpoint_id = self.unique_endpoint(format!("custom_view_{}", name));
        let target =
            CustomRoute { endpoint_id, name: name.to_string(), query_type, config: config.clone() };
        self.routes.insert(path.clone(), RouteTarget::Custom(target));
        log::info!("Registered custom view: {} at {}", name, path);
        Ok(path)
    }

    fn unique_endpoint(&mut self, base: String) -> String {
        let mut id = base.clone();
        let mut n = 2;
        while self.endpoints.contains(&id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        self.endpoints.insert(id.clone());
        id
    }

    pub fn resolve(&self, path: &str) -> Option<&RouteTarget> {
        self.routes.get(normalize_path(path))
    }

    /// Finds a table route by table name, exact match first, then ignoring case.
    pub fn find_table(&self, name: &str) -> Option<&TableRoute> {
        let tables = || {
            self.routes.values().filter_map(|t| match t {
                RouteTarget::Table(table) => Some(table),
                RouteTarget::Custom(_) => None,
            })
        };
        tables()
            .find(|t| t.name == name)
            .or_else(|| tables().find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    /// Path a table is mounted at, if it is exposed.
    pub fn path_of_table(&self, name: &str) -> Option<&str> {
        self.routes.iter().find_map(|(path, target)| match target {
            RouteTarget::Table(t) if t.name == name => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RouteTarget)> {
        self.routes.iter().map(|(path, target)| (path.as_str(), target))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn status_colors(&self) -> &BTreeMap<String, String> {
        &self.status_colors
    }
}

/// Checks that a view can be built. The query itself is built per request so
/// date sentinels follow the calendar.
pub fn validate_view(config: &ViewConfig) -> Result<QueryType, ConfigurationError> {
    let query_type = QueryType::parse(&config.query_type)?;
    build_custom_query(config)?;
    Ok(query_type)
}

// ============================================================================
// Request Rendering
// ============================================================================

/// Query string parameters accepted by table routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub limit: Option<usize>,
    /// Accepted and echoed back; it does not change the statement.
    pub page: usize,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { limit: None, page: 1 }
    }
}

/// Everything the table template needs.
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub table_name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// Result columns minus `hide_columns`.
    pub columns: Vec<String>,
    pub rows: Vec<FormattedRow>,
    pub limit: usize,
    pub page: usize,
    pub config: TableOverride,
}

/// Rows of a custom view, formatted only when the view declares
/// `column_overrides`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ViewRows {
    Formatted(Vec<FormattedRow>),
    Raw(Vec<Row>),
}

impl ViewRows {
    pub fn len(&self) -> usize {
        match self {
            ViewRows::Formatted(rows) => rows.len(),
            ViewRows::Raw(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_formatted(&self) -> bool {
        matches!(self, ViewRows::Formatted(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomPage {
    pub view_name: String,
    pub display_name: String,
    pub template: String,
    pub columns: Vec<String>,
    pub rows: ViewRows,
    pub config: ViewConfig,
}

/// Body of the JSON table API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    pub table: String,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub count: usize,
}

/// Runs one table route: merge the runtime limit into the override, build,
/// execute, format.
pub async fn render_table<C>(
    conn: &C,
    route: &TableRoute,
    status_colors: &BTreeMap<String, String>,
    params: PageParams,
) -> Result<TablePage, QueryExecutionError>
where
    C: Connection + ?Sized,
{
    let limit = params.limit.or(route.config.default_limit).unwrap_or(DEFAULT_LIMIT);
    let runtime = TableOverride { default_limit: Some(limit), ..route.config.clone() };

    let query = build_table_query(&route.name, &route.schema, Some(&runtime));
    let result = query_builder::execute(conn, &QuerySpec::Table(query), &Params::new()).await?;

    let formatter = TableFormatter::new(Some(&route.schema), &route.config.columns, status_colors);
    let rows = formatter.format_rows(&result.rows);
    let columns =
        result.columns.into_iter().filter(|c| !route.config.hide_columns.contains(c)).collect();

    Ok(TablePage {
        table_name: route.name.clone(),
        display_name: route.config.display_name.clone().unwrap_or_else(|| route.name.clone()),
        description: route.config.description.clone(),
        columns,
        rows,
        limit,
        page: params.page,
        config: route.config.clone(),
    })
}

/// Runs one custom view. Request parameters may only replace parameters the
/// view already declares, and only reach stored procedure calls as bound
/// values.
pub async fn render_custom<C>(
    conn: &C,
    route: &CustomRoute,
    status_colors: &BTreeMap<String, String>,
    request: &HashMap<String, String>,
) -> Result<CustomPage, Error>
where
    C: Connection + ?Sized,
{
    let spec = build_custom_query(&route.config)?;
    let runtime: Params = request
        .iter()
        .filter(|(k, _)| route.config.parameters.contains_key(*k))
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let result = query_builder::execute(conn, &spec, &runtime).await?;

    let rows = match &route.config.column_overrides {
        Some(overrides) => {
            let formatter = TableFormatter::new(None, overrides, status_colors);
            ViewRows::Formatted(formatter.format_rows(&result.rows))
        }
        None => ViewRows::Raw(result.rows),
    };

    Ok(CustomPage {
        view_name: route.name.clone(),
        display_name: route.config.display_name.clone().unwrap_or_else(|| route.name.clone()),
        template: route.config.template.clone().unwrap_or_else(|| CUSTOM_VIEW_TEMPLATE.to_string()),
        columns: result.columns,
        rows,
        config: route.config.clone(),
    })
}

/// Raw rows of a table for the JSON API. Only the limit is applied.
pub async fn table_data<C>(
    conn: &C,
    route: &TableRoute,
    limit: Option<usize>,
) -> Result<TableData, QueryExecutionError>
where
    C: Connection + ?Sized,
{
    let config =
        TableOverride { default_limit: Some(limit.unwrap_or(DEFAULT_LIMIT)), ..Default::default() };
    let query = build_table_query(&route.name, &route.schema, Some(&config));
    let result = query_builder::execute(conn, &QuerySpec::Table(query), &Params::new()).await?;

    Ok(TableData {
        table: route.name.clone(),
        count: result.rows.len(),
        columns: result.columns,
        data: result.rows,
    })
}
