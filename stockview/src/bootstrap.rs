//! Startup and rescan orchestration.
//!
//! [`initialize_system`] runs the whole pipeline (discovery, overrides,
//! routes, menu) and publishes the result as one snapshot, so it serves both
//! startup and `/admin/rescan-database`.

use std::sync::Arc;

use stockview_core::{
	views, CacheStore, Connection, Database, OverrideSet, RouteTarget, SchemaDiscovery, Snapshot,
	SnapshotCell, TranslationManager,
};

use crate::{config::Config, render::Renderer, AppState};

/// Connects, loads translations and templates, then runs the first
/// [`initialize_system`]. Failing to enumerate tables aborts startup.
pub async fn initialize(config: &Config) -> Result<AppState, Box<dyn std::error::Error>> {
	let db = Database::builder()
		.max_connections(config.max_connections)
		.connect(&config.database_url)
		.await?;
	log::info!("Connected to {:?} database", db.driver());

	let cache = CacheStore::new(&config.metadata_dir)?;
	let translations =
		Arc::new(TranslationManager::load(&config.translations_dir, &config.default_language)?);
	let renderer = Renderer::new(translations.clone(), config.templates_dir.as_deref())?;

	let state = AppState {
		discovery: Arc::new(SchemaDiscovery::new(db.clone(), cache)),
		db,
		snapshot: Arc::new(SnapshotCell::default()),
		translations,
		renderer: Arc::new(renderer),
		overrides_dir: config.overrides_dir.clone(),
	};

	initialize_system(&state, config.rescan).await?;
	Ok(state)
}

/// Rebuilds and publishes the dashboard snapshot. Requests already holding
/// the previous snapshot finish with it.
pub async fn initialize_system(
	state: &AppState,
	force_scan: bool,
) -> Result<Arc<Snapshot>, stockview_core::Error> {
	log::info!("Initializing dashboard (force scan: {})", force_scan);

	let schema = state.discovery.scan(force_scan).await?;
	log::info!("Schema loaded: {} tables", schema.len());

	let overrides = OverrideSet::load(&state.overrides_dir);
	log::info!(
		"Loaded {} table overrides and {} custom views",
		overrides.tables.len(),
		overrides.views.len()
	);

	let snapshot = Snapshot::build(schema, overrides);
	log::info!(
		"Registered {} routes in {} menu categories",
		snapshot.routes.len(),
		snapshot.menu.len()
	);

	for (path, target) in snapshot.routes.iter() {
		if let RouteTarget::Custom(view) = target {
			let template = view.config.template.as_deref().unwrap_or(views::CUSTOM_VIEW_TEMPLATE);
			if !state.renderer.has_template(template) {
				log::warn!("Template {} of view {} ({}) not found", template, view.name, path);
			}
		}
	}

	state.snapshot.store(snapshot);
	Ok(state.snapshot.load())
}
