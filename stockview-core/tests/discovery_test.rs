use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use stockview_core::{
    database::RawColumn,
    model::{ForeignKeyMeta, IndexMeta},
    CacheStore, Connection, Database, Drivers, FormatterKind, QueryResult, SchemaDiscovery,
    Statement,
};

/// In-memory catalog where one table always fails to introspect.
#[derive(Clone)]
struct FakeCatalog {
    tables: Vec<&'static str>,
    broken: &'static str,
    listed: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for FakeCatalog {
    fn driver(&self) -> Drivers {
        Drivers::SQLite
    }

    async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        self.listed.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.iter().map(|t| t.to_string()).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<RawColumn>, sqlx::Error> {
        if table == self.broken {
            return Err(sqlx::Error::Protocol(format!("permission denied for {}", table)));
        }
        Ok(vec![
            RawColumn {
                name: "ID".into(),
                sql_type: "int".into(),
                nullable: false,
                default: None,
                autoincrement: true,
            },
            RawColumn {
                name: "ORDER_STATUS".into(),
                sql_type: "int".into(),
                nullable: true,
                default: None,
                autoincrement: false,
            },
        ])
    }

    async fn primary_keys(&self, _table: &str) -> Result<Vec<String>, sqlx::Error> {
        Ok(vec!["ID".into()])
    }

    async fn foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKeyMeta>, sqlx::Error> {
        Ok(vec![])
    }

    async fn indexes(&self, _table: &str) -> Result<Vec<IndexMeta>, sqlx::Error> {
        Ok(vec![])
    }

    async fn fetch(&self, _statement: &Statement) -> Result<QueryResult, sqlx::Error> {
        Err(sqlx::Error::Protocol("sampling disabled".into()))
    }
}

fn fake() -> FakeCatalog {
    FakeCatalog {
        tables: vec!["HOST_IMPORT", "BROKEN", "RUN_MISSIONI", "DAT_ARTICOLI"],
        broken: "BROKEN",
        listed: Arc::default(),
    }
}

#[tokio::test]
async fn test_failing_table_is_excluded() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir()?;
    let discovery = SchemaDiscovery::new(fake(), CacheStore::new(dir.path())?);

    let model = discovery.scan(true).await?;

    assert_eq!(model.len(), 3);
    assert!(!model.contains_key("BROKEN"));
    let table = &model["RUN_MISSIONI"];
    assert_eq!(table.columns[1].suggested_formatter, FormatterKind::StatusBadge);
    // sample failures keep the table
    assert!(table.sample_data.is_empty());

    let info = discovery.get_scan_info().ok_or("scan info missing")?;
    assert_eq!(info.tables_count, 3);
    assert_eq!(info.total_columns, 6);
    Ok(())
}

#[tokio::test]
async fn test_fresh_cache_skips_the_database() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let conn = fake();
    let listed = conn.listed.clone();
    let discovery = SchemaDiscovery::new(conn, CacheStore::new(dir.path())?);

    let first = discovery.scan(false).await?;
    assert_eq!(listed.load(Ordering::SeqCst), 1);

    let second = discovery.scan(false).await?;
    assert_eq!(listed.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);

    discovery.scan(true).await?;
    assert_eq!(listed.load(Ordering::SeqCst), 2);

    assert_eq!(discovery.get_table_info("DAT_ARTICOLI").map(|t| t.columns.len()), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_cache_falls_back_to_scan() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("db_schema.json"), "{ truncated")?;
    let conn = fake();
    let listed = conn.listed.clone();
    let discovery = SchemaDiscovery::new(conn, CacheStore::new(dir.path())?);

    let model = discovery.scan(false).await?;
    assert_eq!(model.len(), 3);
    assert_eq!(listed.load(Ordering::SeqCst), 1);
    Ok(())
}

async fn warehouse() -> Result<Database, Box<dyn std::error::Error>> {
    let db = Database::builder().max_connections(1).connect("sqlite::memory:").await?;
    for sql in [
        "CREATE TABLE DAT_ARTICOLI (ARTICLE_ID INTEGER PRIMARY KEY, CODE TEXT NOT NULL UNIQUE, \
         DESCRIPTION VARCHAR(200), WEIGHT REAL, ACTIVE INTEGER DEFAULT 1, CREATED_DATE TEXT)",
        "CREATE TABLE RUN_MISSIONI (MISSION_ID INTEGER PRIMARY KEY, \
         ARTICLE_ID INTEGER REFERENCES DAT_ARTICOLI(ARTICLE_ID), STATUS TEXT, QTY INTEGER, \
         UDC TEXT, PAYLOAD_XML TEXT)",
        "CREATE INDEX idx_missioni_status ON RUN_MISSIONI (STATUS, QTY)",
        "INSERT INTO DAT_ARTICOLI (ARTICLE_ID, CODE, DESCRIPTION, WEIGHT, ACTIVE, CREATED_DATE) \
         VALUES (1, 'A-001', 'Pallet wrap', 12.5, 1, '2024-03-01T08:15:00')",
        "INSERT INTO RUN_MISSIONI (MISSION_ID, ARTICLE_ID, STATUS, QTY, UDC) \
         VALUES (10, 1, 'WAIT', 1200, 'UDC0001')",
    ] {
        db.execute(&Statement::new(sql)).await?;
    }
    Ok(db)
}

#[tokio::test]
async fn test_sqlite_scan_extracts_structure() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let discovery = SchemaDiscovery::new(warehouse().await?, CacheStore::new(dir.path())?);

    let model = discovery.scan(true).await?;
    assert_eq!(model.keys().collect::<Vec<_>>(), ["DAT_ARTICOLI", "RUN_MISSIONI"]);

    let articles = &model["DAT_ARTICOLI"];
    assert_eq!(
        articles.column_names(),
        ["ARTICLE_ID", "CODE", "DESCRIPTION", "WEIGHT", "ACTIVE", "CREATED_DATE"]
    );
    assert_eq!(articles.primary_keys, ["ARTICLE_ID"]);
    let kinds: Vec<FormatterKind> =
        articles.columns.iter().map(|c| c.suggested_formatter).collect();
    assert_eq!(
        kinds,
        [
            FormatterKind::MonospaceId,
            FormatterKind::Text,
            FormatterKind::Text,
            FormatterKind::Decimal,
            FormatterKind::Number,
            FormatterKind::Datetime,
        ]
    );
    let id = articles.column("ARTICLE_ID").ok_or("missing column")?;
    assert!(id.autoincrement);
    assert!(!articles.column("CODE").ok_or("missing column")?.nullable);
    assert_eq!(articles.column("ACTIVE").and_then(|c| c.default.as_deref()), Some("1"));
    assert_eq!(articles.sample_data.len(), 1);

    let missions = &model["RUN_MISSIONI"];
    assert_eq!(missions.foreign_keys.len(), 1);
    assert_eq!(missions.foreign_keys[0].column, "ARTICLE_ID");
    assert_eq!(missions.foreign_keys[0].referenced_table, "DAT_ARTICOLI");
    assert_eq!(missions.foreign_keys[0].referenced_column, "ARTICLE_ID");

    let index =
        missions.indexes.iter().find(|i| i.name == "idx_missioni_status").ok_or("index missing")?;
    assert_eq!(index.columns, ["STATUS", "QTY"]);
    assert!(!index.unique);

    let kinds: Vec<FormatterKind> =
        missions.columns.iter().map(|c| c.suggested_formatter).collect();
    assert_eq!(
        kinds,
        [
            FormatterKind::MonospaceId,
            FormatterKind::MonospaceId,
            FormatterKind::StatusBadge,
            FormatterKind::Number,
            FormatterKind::MonospaceCode,
            FormatterKind::ExpandableCode,
        ]
    );
    Ok(())
}
