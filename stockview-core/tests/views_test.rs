use std::collections::HashMap;

use stockview_core::{
    overrides::ColumnOverride,
    query_builder::{self, QuerySpec},
    views::{render_custom, render_table, table_data, ViewRows},
    CacheStore, Database, Error, FormatterKind, OverrideSet, PageParams, Params, RouteTarget,
    SchemaDiscovery, Snapshot, Statement, TableOverride, ViewConfig,
};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

async fn warehouse() -> TestResult<Database> {
    let db = Database::builder().max_connections(1).connect("sqlite::memory:").await?;
    db.execute(&Statement::new(
        "CREATE TABLE RUN_MISSIONI (MISSION_ID INTEGER PRIMARY KEY, ORDER_STATUS TEXT, \
         QTY INTEGER, NOTES TEXT, PAYLOAD_XML TEXT)",
    ))
    .await?;
    let insert =
        "INSERT INTO RUN_MISSIONI (MISSION_ID, ORDER_STATUS, QTY, NOTES) VALUES (?, ?, ?, ?)";
    let missions = [(1, "COMPL", 1500), (2, "WAIT", 20), (3, "ERR", 7), (4, "UNKNOWN", 42)];
    for (id, status, qty) in missions {
        db.execute(&Statement::new(insert).bind(id).bind(status).bind(qty).bind("internal")).await?;
    }
    db.execute(&Statement::new("CREATE TABLE sysdiagrams (ID INTEGER PRIMARY KEY)")).await?;
    Ok(db)
}

async fn snapshot(db: &Database, overrides: OverrideSet) -> TestResult<Snapshot> {
    let dir = tempfile::tempdir()?;
    let schema = SchemaDiscovery::new(db.clone(), CacheStore::new(dir.path())?).scan(true).await?;
    Ok(Snapshot::build(schema, overrides))
}

#[tokio::test]
async fn test_table_route_renders_bounded_formatted_page() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();
    let db = warehouse().await?;

    let mut overrides = OverrideSet::default();
    overrides.tables.insert(
        "RUN_MISSIONI".into(),
        TableOverride {
            display_name: Some("Missions".into()),
            show_columns: Some(
                ["MISSION_ID", "ORDER_STATUS", "QTY", "NOTES", "PAYLOAD_XML"]
                    .map(String::from)
                    .to_vec(),
            ),
            hide_columns: vec!["NOTES".into()],
            columns: HashMap::from([(
                "QTY".into(),
                ColumnOverride {
                    formatter: Some(FormatterKind::Decimal),
                    decimals: Some(1),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        },
    );
    let snapshot = snapshot(&db, overrides).await?;
    assert!(snapshot.routes.resolve("/table/sysdiagrams").is_none());

    let Some(RouteTarget::Table(route)) = snapshot.routes.resolve("/table/run_missioni") else {
        return Err("table route missing".into());
    };

    let colors = snapshot.routes.status_colors();
    let page = render_table(&db, route, colors, PageParams { limit: Some(3), page: 2 }).await?;
    assert_eq!(page.display_name, "Missions");
    assert_eq!(page.limit, 3);
    assert_eq!(page.page, 2);
    assert_eq!(page.columns, ["MISSION_ID", "ORDER_STATUS", "QTY", "PAYLOAD_XML"]);
    assert_eq!(page.rows.len(), 3);

    // newest first; the hidden column is selected but not listed
    let first = &page.rows[0];
    assert_eq!(first.get("MISSION_ID").map(|d| d.value.as_str()), Some("4"));
    assert!(first.get("NOTES").is_some());
    let badge = first.get("ORDER_STATUS").map(|d| d.css_class.as_str());
    assert_eq!(badge, Some("status-badge status-blue"));
    assert_eq!(first.get("PAYLOAD_XML").map(|d| d.css_class.as_str()), Some("empty-cell"));

    let last = &page.rows[2];
    let badge = last.get("ORDER_STATUS").map(|d| d.css_class.as_str());
    assert_eq!(badge, Some("status-badge status-yellow"));

    let all = render_table(&db, route, colors, PageParams::default()).await?;
    let qty = all.rows[3].get("QTY").ok_or("QTY missing")?;
    assert_eq!(qty.value, "1.500,0");
    Ok(())
}

#[tokio::test]
async fn test_custom_views_format_only_with_column_overrides() -> TestResult {
    let db = warehouse().await?;

    let mut overrides = OverrideSet::default();
    overrides.views.insert(
        "open_missions".into(),
        ViewConfig {
            route: Some("/reports/open".into()),
            query_type: "template".into(),
            query_template: Some(
                "SELECT MISSION_ID, ORDER_STATUS FROM RUN_MISSIONI \
                 WHERE QTY > {min_qty} ORDER BY MISSION_ID"
                    .into(),
            ),
            parameters: [("min_qty".to_string(), serde_json::json!(10))].into_iter().collect(),
            column_overrides: Some(HashMap::from([(
                "ORDER_STATUS".into(),
                ColumnOverride {
                    formatter: Some(FormatterKind::StatusBadge),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        },
    );
    overrides.views.insert(
        "raw_count".into(),
        ViewConfig {
            query: Some("SELECT COUNT(*) AS TOTAL FROM RUN_MISSIONI".into()),
            ..Default::default()
        },
    );
    let broken = ViewConfig { query_type: "graphql".into(), ..Default::default() };
    overrides.views.insert("broken".into(), broken);

    let snapshot = snapshot(&db, overrides).await?;
    assert!(snapshot.routes.resolve("/broken").is_none());

    let Some(RouteTarget::Custom(open)) = snapshot.routes.resolve("/reports/open") else {
        return Err("custom route missing".into());
    };
    let page = render_custom(&db, open, snapshot.routes.status_colors(), &HashMap::new()).await?;
    assert_eq!(page.template, "custom_view.html");
    assert_eq!(page.columns, ["MISSION_ID", "ORDER_STATUS"]);
    let ViewRows::Formatted(rows) = &page.rows else {
        return Err("expected formatted rows".into());
    };
    assert_eq!(rows.len(), 3);
    let badge = rows[0].get("ORDER_STATUS").map(|d| d.css_class.as_str());
    assert_eq!(badge, Some("status-badge status-green"));

    let Some(RouteTarget::Custom(count)) = snapshot.routes.resolve("/raw_count") else {
        return Err("custom route missing".into());
    };
    let page = render_custom(&db, count, snapshot.routes.status_colors(), &HashMap::new()).await?;
    let ViewRows::Raw(rows) = &page.rows else {
        return Err("expected raw rows".into());
    };
    assert_eq!(rows[0]["TOTAL"], serde_json::json!(4));
    Ok(())
}

#[tokio::test]
async fn test_execution_errors_are_typed() -> TestResult {
    let db = warehouse().await?;

    let missing = QuerySpec::Sql("SELECT * FROM MISSING_TABLE".into());
    let err = query_builder::execute(&db, &missing, &Params::new())
        .await
        .err()
        .ok_or("expected an error")?;
    assert!(err.0.contains("MISSING_TABLE"));

    let view = ViewConfig {
        query_type: "stored_procedure".into(),
        procedure: Some("sp_daily".into()),
        parameters: [("d".to_string(), serde_json::json!("TODAY"))].into_iter().collect(),
        ..Default::default()
    };
    let mut overrides = OverrideSet::default();
    overrides.views.insert("daily".into(), view);
    let snapshot = snapshot(&db, overrides).await?;
    let Some(RouteTarget::Custom(daily)) = snapshot.routes.resolve("/daily") else {
        return Err("custom route missing".into());
    };
    let result = render_custom(&db, daily, snapshot.routes.status_colors(), &HashMap::new()).await;
    assert!(matches!(result, Err(Error::Query(_))));
    Ok(())
}

#[tokio::test]
async fn test_empty_result_keeps_projection() -> TestResult {
    let db = Database::builder().max_connections(1).connect("sqlite::memory:").await?;
    let create = "CREATE TABLE HOST_EXPORT (EXPORT_ID INTEGER PRIMARY KEY, MSG_XML TEXT)";
    db.execute(&Statement::new(create)).await?;
    let snapshot = snapshot(&db, OverrideSet::default()).await?;

    let route = snapshot.routes.find_table("host_export").ok_or("route missing")?;
    let data = table_data(&db, route, Some(10)).await?;
    assert_eq!(data.table, "HOST_EXPORT");
    assert_eq!(data.columns, ["EXPORT_ID", "MSG_XML"]);
    assert_eq!(data.count, 0);
    Ok(())
}

#[tokio::test]
async fn test_temporal_decimal_and_boolean_columns_render() -> TestResult {
    let db = Database::builder().max_connections(1).connect("sqlite::memory:").await?;
    db.execute(&Statement::new(
        "CREATE TABLE DAT_ARTICOLI (ARTICLE_ID INTEGER PRIMARY KEY, CREATED DATETIME, \
         WEIGHT DECIMAL(10,2), ACTIVE BOOLEAN)",
    ))
    .await?;
    let insert =
        "INSERT INTO DAT_ARTICOLI (ARTICLE_ID, CREATED, WEIGHT, ACTIVE) VALUES (?, ?, ?, ?)";
    db.execute(&Statement::new(insert).bind(1).bind("2024-03-01 08:15:00").bind(12.5).bind(true))
        .await?;

    let dir = tempfile::tempdir()?;
    let schema = SchemaDiscovery::new(db.clone(), CacheStore::new(dir.path())?).scan(true).await?;
    let articles = &schema["DAT_ARTICOLI"];
    let kinds: Vec<FormatterKind> =
        articles.columns.iter().map(|c| c.suggested_formatter).collect();
    assert_eq!(
        kinds,
        [
            FormatterKind::MonospaceId,
            FormatterKind::Datetime,
            FormatterKind::Decimal,
            FormatterKind::Boolean,
        ]
    );
    assert_eq!(articles.sample_data.len(), 1);

    let snapshot = Snapshot::build(schema, OverrideSet::default());
    let Some(RouteTarget::Table(route)) = snapshot.routes.resolve("/table/dat_articoli") else {
        return Err("table route missing".into());
    };
    let colors = snapshot.routes.status_colors();
    let page = render_table(&db, route, colors, PageParams::default()).await?;
    assert_eq!(page.columns, ["ARTICLE_ID", "CREATED", "WEIGHT", "ACTIVE"]);

    let row = &page.rows[0];
    assert_eq!(row.get("CREATED").map(|d| d.value.as_str()), Some("2024-03-01 08:15:00"));
    assert!(row.get("CREATED").and_then(|d| d.timestamp).is_some());
    assert_eq!(row.get("WEIGHT").map(|d| d.value.as_str()), Some("12,50"));
    assert_eq!(row.get("ACTIVE").map(|d| d.value.as_str()), Some("✓"));

    let data = table_data(&db, route, None).await?;
    assert_eq!(data.data[0]["CREATED"], serde_json::json!("2024-03-01 08:15:00"));
    Ok(())
}
