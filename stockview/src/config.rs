use std::path::PathBuf;

use clap::Parser;

/// Server settings. Every flag falls back to an environment variable, and
/// `.env` is loaded before parsing.
#[derive(Debug, Clone, Parser)]
#[command(name = "stockview", version, about = "Dynamic dashboard over a warehouse database")]
pub struct Config {
    /// Connection URL (postgres://, mysql:// or sqlite:)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind_addr: String,

    /// Schema cache directory
    #[arg(long, env = "METADATA_DIR", default_value = "metadata")]
    pub metadata_dir: PathBuf,

    /// Root of `tables/`, `views/` and `global.yaml`
    #[arg(long, env = "OVERRIDES_DIR", default_value = "overrides")]
    pub overrides_dir: PathBuf,

    #[arg(long, env = "TRANSLATIONS_DIR", default_value = "translations")]
    pub translations_dir: PathBuf,

    /// Extra templates referenced by custom views
    #[arg(long, env = "TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    #[arg(long, env = "DEFAULT_LANGUAGE", default_value = "it")]
    pub default_language: String,

    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Ignore the schema cache on startup
    #[arg(long)]
    pub rescan: bool,
}
