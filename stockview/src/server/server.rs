use axum::{routing::get, Router};

use crate::{
	handlers::{admin, api, pages},
	AppState,
};

/// Fixed routes first; everything else is resolved against the route table
/// of the current snapshot, so a rescan changes the exposed paths without
/// rebuilding the router.
pub fn router(a_state: AppState) -> Router {
	let admin_group = Router::new()
		.route("/schema-info", get(admin::schema_info))
		.route("/rescan-database", get(admin::rescan_database))
		.route("/clear-cache", get(admin::clear_cache));

	let api_group = Router::new()
		.route("/translations/{lang}", get(api::translations))
		.route("/table/{name}", get(api::table));

	Router::new()
		.route("/", get(pages::index))
		.route("/set-language/{lang}", get(pages::set_language))
		.nest("/admin", admin_group)
		.nest("/api", api_group)
		.fallback(pages::dispatch)
		.with_state(a_state)
}

pub async fn start_http(a_state: AppState, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(a_state);

	let listener = tokio::net::TcpListener::bind(addr).await?;
	log::info!("Listening on http://{}", listener.local_addr()?);
	axum::serve(listener, app).await?;
	Ok(())
}
