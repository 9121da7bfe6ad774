use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use stockview_core::{Database, SchemaDiscovery, SnapshotCell, TranslationManager};

use crate::{config::Config, render::Renderer};

mod bootstrap;
mod config;
mod handlers;
mod render;
mod server;

#[derive(Clone)]
pub struct AppState {
	db: Database,
	discovery: Arc<SchemaDiscovery<Database>>,
	snapshot: Arc<SnapshotCell>,
	translations: Arc<TranslationManager>,
	renderer: Arc<Renderer>,
	overrides_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	dotenvy::dotenv().ok();
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let config = Config::parse();
	let state = bootstrap::initialize(&config).await?;

	server::start_http(state, &config.bind_addr).await?;
	Ok(())
}
