use axum::http::{header, HeaderMap};
use stockview_core::TranslationManager;

pub mod admin;
pub mod api;
pub mod pages;

pub const LANG_COOKIE: &str = "lang";

/// Language from the `lang` cookie when it names a loaded language, else the
/// default one.
pub fn request_language(headers: &HeaderMap, translations: &TranslationManager) -> String {
	headers
		.get_all(header::COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(';'))
		.filter_map(|pair| pair.trim().split_once('='))
		.find(|(name, _)| *name == LANG_COOKIE)
		.map(|(_, lang)| lang)
		.filter(|lang| translations.supports(lang))
		.unwrap_or(translations.default_language())
		.to_string()
}

#[cfg(test)]
pub(crate) mod testing {
	use std::{path::Path, sync::Arc};

	use stockview_core::{
		CacheStore, Database, SchemaDiscovery, SnapshotCell, Statement, TranslationManager,
	};
	use tempfile::TempDir;

	use crate::{bootstrap, render::Renderer, AppState};

	pub fn write(root: &Path, rel: &str, content: &str) {
		let path = root.join(rel);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(path, content).unwrap();
	}

	/// Initialized state over an in-memory warehouse. The directory holds
	/// `metadata/`, `overrides/` and `translations/`.
	pub async fn state() -> Result<(TempDir, AppState), Box<dyn std::error::Error>> {
		let _ = env_logger::builder().is_test(true).try_init();
		let root = tempfile::tempdir()?;

		let db = Database::builder().max_connections(1).connect("sqlite::memory:").await?;
		for sql in [
			"CREATE TABLE RUN_MISSIONI (MISSION_ID INTEGER PRIMARY KEY, ORDER_STATUS TEXT, \
			 QTY INTEGER, CREATED DATETIME)",
			"INSERT INTO RUN_MISSIONI (MISSION_ID, ORDER_STATUS, QTY, CREATED) \
			 VALUES (1, 'COMPL', 10, '2024-02-29 17:40:00')",
			"INSERT INTO RUN_MISSIONI (MISSION_ID, ORDER_STATUS, QTY, CREATED) \
			 VALUES (2, 'ERR', 0, '2024-03-01 08:15:00')",
		] {
			db.execute(&Statement::new(sql)).await?;
		}

		write(
			root.path(),
			"overrides/views/mission_count.yaml",
			"route: /reports/missions\n\
			 display_name: Mission count\n\
			 query: SELECT COUNT(*) AS TOTAL FROM RUN_MISSIONI\n",
		);

		let translations =
			Arc::new(TranslationManager::load(root.path().join("translations"), "it")?);
		let cache = CacheStore::new(root.path().join("metadata"))?;
		let state = AppState {
			discovery: Arc::new(SchemaDiscovery::new(db.clone(), cache)),
			db,
			snapshot: Arc::new(SnapshotCell::default()),
			renderer: Arc::new(Renderer::new(translations.clone(), None)?),
			translations,
			overrides_dir: root.path().join("overrides"),
		};
		bootstrap::initialize_system(&state, true).await?;
		Ok((root, state))
	}
}
