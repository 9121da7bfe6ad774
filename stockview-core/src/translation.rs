//! # Translations
//!
//! One JSON document per language in a directory (`it.json`, `en.json`, ...).
//! Keys are dotted paths into the document. A missing key never fails
//! rendering: it is logged and the key itself is shown.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde_json::{json, Value};

use crate::Error;

pub const DEFAULT_LANGUAGE: &str = "it";

#[derive(Debug, Clone)]
pub struct TranslationManager {
    dir: PathBuf,
    default_language: String,
    translations: BTreeMap<String, Value>,
}

impl TranslationManager {
    /// Loads every `*.json` document in `dir`. When the directory does not
    /// exist it is created with default Italian and English documents.
    /// A document that is not valid JSON is logged and skipped.
    pub fn load(
        dir: impl Into<PathBuf>,
        default_language: impl Into<String>,
    ) -> Result<Self, Error> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            write_defaults(&dir)?;
        }

        let mut translations = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match read_document(&path) {
                Ok(document) => {
                    translations.insert(lang, document);
                }
                Err(e) => log::error!("Skipping translation {}: {}", path.display(), e),
            }
        }

        let manager = Self { dir, default_language: default_language.into(), translations };
        log::info!("Languages loaded: {}", manager.languages().join(", "));
        Ok(manager)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn languages(&self) -> Vec<&str> {
        self.translations.keys().map(String::as_str).collect()
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.translations.contains_key(lang)
    }

    /// The whole document for a language.
    pub fn document(&self, lang: &str) -> Option<&Value> {
        self.translations.get(lang)
    }

    /// Looks up `key` (e.g. `header.title`) in `lang`, or in the default
    /// language when `lang` is unknown or absent, and fills `{var}`
    /// placeholders from `vars`.
    pub fn get(&self, key: &str, lang: Option<&str>, vars: &[(&str, &str)]) -> String {
        let lang = match lang {
            Some(lang) if self.supports(lang) => lang,
            _ => self.default_language.as_str(),
        };

        let found = self
            .translations
            .get(lang)
            .and_then(|doc| key.split('.').try_fold(doc, |node, part| node.get(part)));

        let text = match found {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => {
                log::warn!("Missing translation: {} ({})", key, lang);
                return key.to_string();
            }
        };

        vars.iter().fold(text, |text, (name, value)| text.replace(&format!("{{{}}}", name), value))
    }
}

fn read_document(path: &Path) -> Result<Value, Error> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_defaults(dir: &Path) -> Result<(), Error> {
    let it = json!({
        "meta": {"language_name": "Italiano", "language_code": "it"},
        "header": {
            "title": "Stockview Dashboard",
            "subtitle": "Visualizza e gestisci i dati del tuo impianto",
            "home_aria": "Homepage"
        },
        "footer": {"copyright": "© {year} Database Management System"},
        "menu": {"custom_views": "Viste personalizzate"},
        "search": {
            "placeholder": "🔍 Cerca tabelle, report o visualizzazioni...",
            "table_placeholder": "🔍 Cerca nella tabella...",
            "clear": "Cancella",
            "no_results": "🔍 Nessun risultato trovato per la tua ricerca.",
            "results_count": "{visible} / {total} righe"
        },
        "table": {
            "row_number": "#",
            "empty_cell": "—",
            "rows_shown": "{count} righe (limite {limit})",
            "no_rows": "Nessun dato"
        },
        "errors": {
            "not_found": "Pagina non trovata",
            "table": "Errore nel caricamento della tabella",
            "view": "Errore nel caricamento della vista"
        },
        "language_selector": {
            "change_language": "Cambia lingua",
            "current": "Lingua corrente: {language}"
        }
    });
    let en = json!({
        "meta": {"language_name": "English", "language_code": "en"},
        "header": {
            "title": "Stockview Dashboard",
            "subtitle": "View and manage your plant data",
            "home_aria": "Homepage"
        },
        "footer": {"copyright": "© {year} Database Management System"},
        "menu": {"custom_views": "Custom views"},
        "search": {
            "placeholder": "🔍 Search tables, reports or views...",
            "table_placeholder": "🔍 Search in table...",
            "clear": "Clear",
            "no_results": "🔍 No results found for your search.",
            "results_count": "{visible} / {total} rows"
        },
        "table": {
            "row_number": "#",
            "empty_cell": "—",
            "rows_shown": "{count} rows (limit {limit})",
            "no_rows": "No data"
        },
        "errors": {
            "not_found": "Page not found",
            "table": "Error loading table",
            "view": "Error loading view"
        },
        "language_selector": {
            "change_language": "Change language",
            "current": "Current language: {language}"
        }
    });

    fs::write(dir.join("it.json"), serde_json::to_string_pretty(&it)?)?;
    fs::write(dir.join("en.json"), serde_json::to_string_pretty(&en)?)?;
    log::info!("Created default translations: it.json, en.json");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_when_directory_is_missing() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("translations");

        let manager = TranslationManager::load(&dir, "it").unwrap();
        assert_eq!(manager.languages(), ["en", "it"]);
        assert!(dir.join("it.json").exists());
        assert_eq!(manager.get("meta.language_name", Some("en"), &[]), "English");
    }

    #[test]
    fn lookup_falls_back_and_substitutes() {
        let dir = tempfile::tempdir().unwrap();
        let it = r#"{"footer": {"copyright": "© {year} Magazzino"}, "n": 3}"#;
        let en = r#"{"footer": {"copyright": "© {year} Warehouse"}}"#;
        fs::write(dir.path().join("it.json"), it).unwrap();
        fs::write(dir.path().join("en.json"), en).unwrap();
        fs::write(dir.path().join("de.json"), "{ broken").unwrap();

        let manager = TranslationManager::load(dir.path(), "it").unwrap();
        assert_eq!(manager.languages(), ["en", "it"]);
        let year = [("year", "2026")];
        assert_eq!(manager.get("footer.copyright", Some("en"), &year), "© 2026 Warehouse");
        // unknown language -> default language
        assert_eq!(manager.get("footer.copyright", Some("fr"), &year), "© 2026 Magazzino");
        assert_eq!(manager.get("n", None, &[]), "3");
    }

    #[test]
    fn missing_key_returns_the_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("it.json"), r#"{"header": {"title": "Titolo"}}"#).unwrap();

        let manager = TranslationManager::load(dir.path(), "it").unwrap();
        assert_eq!(manager.get("header.subtitle", None, &[]), "header.subtitle");
        assert_eq!(manager.get("header", None, &[]), "header");
        assert_eq!(manager.get("header.title.deeper", None, &[]), "header.title.deeper");
    }
}
