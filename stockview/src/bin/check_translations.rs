//! Consistency report over the translation documents.
//!
//! Exits with a failure status when any language is incomplete, after
//! writing `missing_<lang>.json` templates for the incomplete ones.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use stockview_core::TranslationChecker;

#[derive(Debug, Parser)]
#[command(
	name = "check-translations",
	version,
	about = "Check translation documents for missing or untranslated keys"
)]
struct Args {
	#[arg(long, env = "TRANSLATIONS_DIR", default_value = "translations")]
	dir: PathBuf,

	/// Language that defines the expected key set
	#[arg(long, env = "DEFAULT_LANGUAGE", default_value = "it")]
	reference: String,

	/// Where missing-key templates are written. Keep it outside `--dir`, or
	/// the next run will read them as languages.
	#[arg(long, default_value = ".")]
	export_dir: PathBuf,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
	dotenvy::dotenv().ok();
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args = Args::parse();
	let checker = TranslationChecker::load(&args.dir)?;
	log::info!("Loaded languages: {}", checker.languages().join(", "));

	println!("== Completeness (reference: {}) ==", args.reference);
	let reports = checker.completeness(&args.reference);
	for report in &reports {
		if report.is_complete() {
			println!("{}: complete ({} keys)", report.language, report.keys);
			continue;
		}
		println!(
			"{}: {} keys, {} missing, {} extra",
			report.language,
			report.keys,
			report.missing.len(),
			report.extra.len()
		);
		for key in &report.missing {
			println!("  - missing {}", key);
		}
		for key in &report.extra {
			println!("  + extra   {}", key);
		}
	}

	println!("\n== Statistics ==");
	for stats in checker.statistics() {
		println!(
			"{} ({}): {} keys, {:.2} KB",
			stats.language, stats.language_name, stats.keys, stats.size_kb
		);
	}

	let identical = checker.identical_values(&args.reference);
	if !identical.is_empty() {
		println!("\n== Possibly untranslated ==");
		for found in identical {
			println!("{} = {:?} in {}", found.key, found.value, found.languages.join(", "));
		}
	}

	if reports.iter().all(|r| r.is_complete()) {
		log::info!("All translations are complete");
		return Ok(ExitCode::SUCCESS);
	}

	let written = checker.export_missing(&args.export_dir)?;
	log::warn!(
		"{} template(s) of missing keys written to {}",
		written.len(),
		args.export_dir.display()
	);
	Ok(ExitCode::FAILURE)
}
