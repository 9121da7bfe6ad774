use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};
use stockview_core::{cache::CacheEntryInfo, ScanInfo};

use crate::{bootstrap, handlers::api::ApiErrors, AppState};

#[derive(Debug, Serialize)]
pub struct SchemaInfo {
	scan_info: Option<ScanInfo>,
	cache_info: BTreeMap<String, CacheEntryInfo>,
	tables_count: usize,
	overrides_count: usize,
	custom_views: Vec<String>,
	routes_count: usize,
}

pub async fn schema_info(State(state): State<AppState>) -> Json<SchemaInfo> {
	let snapshot = state.snapshot.load();

	Json(SchemaInfo {
		scan_info: state.discovery.get_scan_info(),
		cache_info: state.discovery.cache().info(),
		tables_count: snapshot.schema.len(),
		overrides_count: snapshot.overrides.tables.len(),
		custom_views: snapshot.overrides.views.keys().cloned().collect(),
		routes_count: snapshot.routes.len(),
	})
}

pub async fn rescan_database(State(state): State<AppState>) -> Result<Json<Value>, ApiErrors> {
	log::info!("Forcing database rescan...");
	let snapshot = bootstrap::initialize_system(&state, true).await.map_err(|e| {
		log::error!("Rescan failed: {}", e);
		ApiErrors::ServerError(e.to_string())
	})?;

	Ok(Json(json!({
		"status": "success",
		"message": "Database rescanned successfully",
		"tables_count": snapshot.schema.len(),
	})))
}

pub async fn clear_cache(State(state): State<AppState>) -> Result<Json<Value>, ApiErrors> {
	state.discovery.cache().invalidate(None).map_err(|e| ApiErrors::ServerError(e.to_string()))?;
	log::info!("All caches cleared");

	Ok(Json(json!({
		"status": "success",
		"message": "All caches cleared",
	})))
}
