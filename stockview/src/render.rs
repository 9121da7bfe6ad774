//! HTML rendering with minijinja.
//!
//! The dashboard pages ship inside the binary. A custom view may name its own
//! template, which is then looked up in the optional templates directory.

use std::{path::Path, sync::Arc};

use chrono::{Datelike, Local};
use minijinja::{context, path_loader, value::Kwargs, Environment, State, Value};
use stockview_core::TranslationManager;

const BUILTIN_TEMPLATES: [(&str, &str); 6] = [
	("base.html", include_str!("../templates/base.html")),
	("_cell.html", include_str!("../templates/_cell.html")),
	("menu.html", include_str!("../templates/menu.html")),
	("table.html", include_str!("../templates/table.html")),
	("custom_view.html", include_str!("../templates/custom_view.html")),
	("error.html", include_str!("../templates/error.html")),
];

pub struct Renderer {
	env: Environment<'static>,
	translations: Arc<TranslationManager>,
}

impl Renderer {
	pub fn new(
		translations: Arc<TranslationManager>,
		templates_dir: Option<&Path>,
	) -> Result<Self, minijinja::Error> {
		let mut env = Environment::new();
		for (name, source) in BUILTIN_TEMPLATES {
			env.add_template(name, source)?;
		}

		if let Some(dir) = templates_dir {
			log::info!("View templates directory: {}", dir.display());
			env.set_loader(path_loader(dir));
		}

		// `t("key", var=value)` in the language of the page being rendered
		let lookup = translations.clone();
		env.add_function("t", move |state: &State, key: String, kwargs: Kwargs| {
			translate(&lookup, state, &key, &kwargs)
		});

		Ok(Self { env, translations })
	}

	pub fn has_template(&self, name: &str) -> bool {
		self.env.get_template(name).is_ok()
	}

	/// Renders `name` with `page` merged into the shared context (`lang`,
	/// `languages`, `year`).
	pub fn render(&self, name: &str, lang: &str, page: Value) -> Result<String, minijinja::Error> {
		let languages: Vec<Value> = self
			.translations
			.languages()
			.into_iter()
			.map(|code| {
				let name = self.translations.get("meta.language_name", Some(code), &[]);
				context! { code, name }
			})
			.collect();

		let ctx = context! { lang, languages, year => Local::now().year(), ..page };
		self.env.get_template(name)?.render(ctx)
	}

	/// Error page body. Never fails: a broken error template degrades to a
	/// bare status line.
	pub fn error_page(&self, lang: &str, status: u16, title_key: &str, message: &str) -> String {
		let title = self.translations.get(title_key, Some(lang), &[]);
		match self.render("error.html", lang, context! { status, title, message }) {
			Ok(body) => body,
			Err(e) => {
				log::error!("Error template failed: {}", e);
				format!("{} {}", status, title)
			}
		}
	}
}

fn translate(
	translations: &TranslationManager,
	state: &State,
	key: &str,
	kwargs: &Kwargs,
) -> Result<String, minijinja::Error> {
	let lang = state.lookup("lang");
	let lang = lang.as_ref().and_then(Value::as_str);

	let mut vars = Vec::new();
	for name in kwargs.args() {
		let value: Value = kwargs.get(name)?;
		vars.push((name, value.to_string()));
	}
	let vars: Vec<(&str, &str)> =
		vars.iter().map(|(name, value)| (*name, value.as_str())).collect();

	Ok(translations.get(key, lang, &vars))
}
