//! # Query Builder
//!
//! Turns a table schema plus its override, or a custom view definition, into
//! something executable, and runs it. Table queries are always bounded and
//! ordered. Custom views come in three shapes: a literal statement, a stored
//! procedure call, or a `{placeholder}` template.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use serde_json::Value;

use crate::{
    database::{Connection, Drivers, QueryResult, Statement},
    error::{ConfigurationError, QueryExecutionError},
    model::TableSchema,
    overrides::{Params, TableOverride, ViewConfig},
};

/// Row limit when neither the override nor the request sets one.
pub const DEFAULT_LIMIT: usize = 100;

/// Parameter value expanded to the current day.
pub const TODAY: &str = "TODAY";
/// Parameter value expanded to the next day.
pub const TOMORROW: &str = "TOMORROW";

const SENTINEL_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Query Shapes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    Column { name: String, descending: bool },
    /// Clause taken verbatim from configuration.
    Raw(String),
}

/// A bounded read of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub table: String,
    pub columns: Vec<String>,
    /// Declared type per column. Columns without an entry are selected as is.
    pub column_types: BTreeMap<String, String>,
    pub filters: Vec<String>,
    pub order_by: Option<OrderBy>,
    pub limit: usize,
}

impl TableQuery {
    pub fn to_statement(&self, driver: Drivers) -> Statement {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            let columns: Vec<String> =
                self.columns.iter().map(|c| self.select_column(c, driver)).collect();
            columns.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, driver.quote(&self.table));

        if !self.filters.is_empty() {
            let predicates: Vec<String> = self.filters.iter().map(|f| format!("({})", f)).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        match &self.order_by {
            Some(OrderBy::Column { name, descending }) => {
                // a cast column shares its name with the text alias
                let column = match self.column_types.get(name) {
                    Some(ty) if !driver.decodes_natively(ty) => {
                        format!("{}.{}", driver.quote(&self.table), driver.quote(name))
                    }
                    _ => driver.quote(name),
                };
                let direction = if *descending { "DESC" } else { "ASC" };
                sql.push_str(&format!(" ORDER BY {} {}", column, direction));
            }
            Some(OrderBy::Raw(clause)) => {
                sql.push_str(" ORDER BY ");
                sql.push_str(clause);
            }
            None => {}
        }

        sql.push_str(&format!(" LIMIT {}", self.limit));
        Statement::new(sql)
    }

    fn select_column(&self, column: &str, driver: Drivers) -> String {
        match self.column_types.get(column) {
            Some(ty) => driver.select_column(column, ty),
            None => driver.quote(column),
        }
    }
}

/// One procedure argument, after sentinel expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcParam {
    /// Sent as a bound parameter.
    Bound(Value),
    /// Written into the statement as a `yyyy-MM-dd` literal.
    Date(NaiveDate),
}

impl ProcParam {
    fn expand(value: &Value, today: NaiveDate) -> Self {
        match value.as_str() {
            Some(TODAY) => ProcParam::Date(today),
            Some(TOMORROW) => ProcParam::Date(today.succ_opt().unwrap_or(today)),
            _ => ProcParam::Bound(value.clone()),
        }
    }
}

/// A stored procedure invocation with its arguments in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    pub procedure: String,
    pub parameters: Vec<(String, ProcParam)>,
    /// Day the sentinels were expanded against.
    pub today: NaiveDate,
}

impl ProcedureCall {
    pub fn new(procedure: impl Into<String>, parameters: &Params, today: NaiveDate) -> Self {
        Self {
            procedure: procedure.into(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.clone(), ProcParam::expand(v, today)))
                .collect(),
            today,
        }
    }

    /// Merges request parameters over the configured ones. Existing names keep
    /// their position; new names are appended.
    pub fn with_params(&self, runtime: &Params) -> Self {
        let mut call = self.clone();
        for (key, value) in runtime {
            let param = ProcParam::expand(value, self.today);
            match call.parameters.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = param,
                None => call.parameters.push((key.clone(), param)),
            }
        }
        call
    }

    pub fn to_statement(&self, driver: Drivers) -> Result<Statement, QueryExecutionError> {
        let mut binds = Vec::new();
        let mut arguments = Vec::with_capacity(self.parameters.len());

        for (_, param) in &self.parameters {
            match param {
                ProcParam::Date(date) => {
                    arguments.push(format!("'{}'", date.format(SENTINEL_DATE_FORMAT)))
                }
                ProcParam::Bound(value) => {
                    binds.push(value.clone());
                    arguments.push(driver.placeholder(binds.len()));
                }
            }
        }

        let sql = match driver {
            Drivers::Postgres => {
                format!("SELECT * FROM {}({})", self.procedure, arguments.join(", "))
            }
            Drivers::MySQL => format!("CALL {}({})", self.procedure, arguments.join(", ")),
            Drivers::SQLite => {
                return Err(QueryExecutionError(format!(
                    "stored procedure {} cannot run: SQLite has no stored procedures",
                    self.procedure
                )));
            }
        };

        Ok(Statement { sql, binds })
    }
}

/// Something the query builder knows how to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    Table(TableQuery),
    Sql(String),
    Procedure(ProcedureCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Sql,
    StoredProcedure,
    Template,
}

impl QueryType {
    pub fn parse(tag: &str) -> Result<Self, ConfigurationError> {
        match tag {
            "sql" => Ok(QueryType::Sql),
            "stored_procedure" => Ok(QueryType::StoredProcedure),
            "template" => Ok(QueryType::Template),
            other => Err(ConfigurationError::UnknownQueryType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sql => "sql",
            QueryType::StoredProcedure => "stored_procedure",
            QueryType::Template => "template",
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Builds the read query for a discovered table.
///
/// - columns: `show_columns` if set, else every column minus `hide_columns`
/// - limit: `default_limit`, else [`DEFAULT_LIMIT`]
/// - order: `order_by`, else first primary key DESC, else first column DESC
/// - filters: ANDed
pub fn build_table_query(
    table_name: &str,
    schema: &TableSchema,
    config: Option<&TableOverride>,
) -> TableQuery {
    let columns = match config.and_then(|c| c.show_columns.clone()) {
        Some(show) => show,
        None => {
            let hidden: &[String] = config.map(|c| c.hide_columns.as_slice()).unwrap_or_default();
            schema.columns.iter().map(|c| c.name.clone()).filter(|c| !hidden.contains(c)).collect()
        }
    };

    let order_by = match config.and_then(|c| c.order_by.clone()) {
        Some(clause) => Some(OrderBy::Raw(clause)),
        None => schema
            .primary_keys
            .first()
            .or_else(|| schema.columns.first().map(|c| &c.name))
            .map(|name| OrderBy::Column { name: name.clone(), descending: true }),
    };

    let column_types = schema
        .columns
        .iter()
        .filter(|c| columns.contains(&c.name))
        .map(|c| (c.name.clone(), c.sql_type.clone()))
        .collect();

    TableQuery {
        table: table_name.to_string(),
        columns,
        column_types,
        filters: config.map(|c| c.filters.clone()).unwrap_or_default(),
        order_by,
        limit: config.and_then(|c| c.default_limit).unwrap_or(DEFAULT_LIMIT),
    }
}

/// Builds a custom view's query, expanding date sentinels against today.
pub fn build_custom_query(view: &ViewConfig) -> Result<QuerySpec, ConfigurationError> {
    build_custom_query_at(view, Local::now().date_naive())
}

/// [`build_custom_query`] with an explicit current day.
pub fn build_custom_query_at(
    view: &ViewConfig,
    today: NaiveDate,
) -> Result<QuerySpec, ConfigurationError> {
    let query_type = QueryType::parse(&view.query_type)?;
    let missing =
        |field| ConfigurationError::MissingField { query_type: query_type.as_str(), field };

    match query_type {
        QueryType::Sql => Ok(QuerySpec::Sql(view.query.clone().ok_or_else(|| missing("query"))?)),
        QueryType::StoredProcedure => {
            let procedure = view.procedure.as_deref().ok_or_else(|| missing("procedure"))?;
            Ok(QuerySpec::Procedure(ProcedureCall::new(procedure, &view.parameters, today)))
        }
        QueryType::Template => {
            let template = view.query_template.as_deref().ok_or_else(|| missing("query_template"))?;
            Ok(QuerySpec::Sql(fill_template(template, &view.parameters)))
        }
    }
}

/// Substitutes `{name}` placeholders in one left-to-right pass, so substituted
/// text is never scanned again. Unknown placeholders are left as-is.
pub fn fill_template(template: &str, parameters: &Params) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value =
            after.find('}').and_then(|close| Some((close, parameters.get(&after[..close])?)));
        match value {
            Some((close, value)) => {
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Execution
// ============================================================================

/// Runs a query of any shape and normalizes the result. `params` only apply to
/// procedure calls.
pub async fn execute<C>(
    conn: &C,
    spec: &QuerySpec,
    params: &Params,
) -> Result<QueryResult, QueryExecutionError>
where
    C: Connection + ?Sized,
{
    let driver = conn.driver();
    let statement = match spec {
        QuerySpec::Table(query) => query.to_statement(driver),
        QuerySpec::Sql(sql) => Statement::new(sql.clone()),
        QuerySpec::Procedure(call) => call.with_params(params).to_statement(driver)?,
    };

    log::debug!("Executing: {}", statement.sql);
    let mut result = conn.fetch(&statement).await?;

    if result.columns.is_empty() {
        if let QuerySpec::Table(query) = spec {
            result.columns = query.columns.clone();
        }
    }
    Ok(result)
}
