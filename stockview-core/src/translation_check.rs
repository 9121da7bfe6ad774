//! # Translation Checker
//!
//! Consistency checks over a translations directory: which languages miss
//! keys the others have, how large each document is, and which values are
//! identical across every language and so were probably never translated.
//! That last check is a heuristic and may report false positives.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::Error;

/// Substrings that make an identical value acceptable in every language.
pub const TECHNICAL_TERMS: [&str; 7] = ["XML", "JSON", "API", "ID", "CSV", "URL", "HTTP"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub language: String,
    pub keys: usize,
    /// Keys some other language has and this one lacks.
    pub missing: Vec<String>,
    /// Keys absent from the reference language.
    pub extra: Vec<String>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageStats {
    pub language: String,
    pub language_name: String,
    pub keys: usize,
    pub size_kb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdenticalValue {
    pub key: String,
    pub value: String,
    pub languages: Vec<String>,
}

pub struct TranslationChecker {
    translations: BTreeMap<String, Value>,
    keys: BTreeMap<String, BTreeSet<String>>,
}

impl TranslationChecker {
    /// Loads every `*.json` document. Unlike the runtime manager, a missing
    /// directory, an empty one, or an unparsable document is an error.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let mut translations = BTreeMap::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let document: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
            translations.insert(lang.to_string(), document);
        }

        if translations.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no translation documents in {}", dir.display()),
            )));
        }
        Ok(Self::from_documents(translations))
    }

    pub fn from_documents(translations: BTreeMap<String, Value>) -> Self {
        let keys = translations
            .iter()
            .map(|(lang, doc)| (lang.clone(), flatten_keys(doc).into_iter().collect()))
            .collect();
        Self { translations, keys }
    }

    pub fn languages(&self) -> Vec<&str> {
        self.translations.keys().map(String::as_str).collect()
    }

    pub fn key_count(&self, lang: &str) -> usize {
        self.keys.get(lang).map_or(0, BTreeSet::len)
    }

    fn all_keys(&self) -> BTreeSet<&String> {
        self.keys.values().flatten().collect()
    }

    /// Per-language completeness. `reference` decides what counts as extra;
    /// when it is not loaded, nothing is extra.
    pub fn completeness(&self, reference: &str) -> Vec<CompletenessReport> {
        let all = self.all_keys();
        let reference_keys = self.keys.get(reference);

        self.keys
            .iter()
            .map(|(lang, keys)| CompletenessReport {
                language: lang.clone(),
                keys: keys.len(),
                missing: all
                    .iter()
                    .filter(|k| !keys.contains(**k))
                    .map(|k| k.to_string())
                    .collect(),
                extra: match reference_keys {
                    Some(reference_keys) => keys.difference(reference_keys).cloned().collect(),
                    None => Vec::new(),
                },
            })
            .collect()
    }

    pub fn statistics(&self) -> Vec<LanguageStats> {
        self.translations
            .iter()
            .map(|(lang, doc)| LanguageStats {
                language: lang.clone(),
                language_name: doc
                    .pointer("/meta/language_name")
                    .and_then(Value::as_str)
                    .unwrap_or(lang)
                    .to_string(),
                keys: self.key_count(lang),
                size_kb: serde_json::to_string_pretty(doc).map(|s| s.len()).unwrap_or(0) as f64
                    / 1024.0,
            })
            .collect()
    }

    /// Keys of `reference` whose non-empty value is the same in every language
    /// that has it, present in at least two languages, and not exempt by
    /// [`is_valid_identical`].
    pub fn identical_values(&self, reference: &str) -> Vec<IdenticalValue> {
        let Some(reference_keys) = self.keys.get(reference) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for key in reference_keys {
            let values: Vec<(&String, &Value)> = self
                .translations
                .iter()
                .filter_map(|(lang, doc)| leaf(doc, key).map(|v| (lang, v)))
                .filter(|(_, v)| is_truthy(v))
                .collect();

            let Some((_, first)) = values.first() else {
                continue;
            };
            if values.len() < 2 || values.iter().any(|(_, v)| v != first) {
                continue;
            }
            if let Value::String(text) = first {
                if !is_valid_identical(text) {
                    found.push(IdenticalValue {
                        key: key.clone(),
                        value: text.clone(),
                        languages: values.iter().map(|(lang, _)| lang.to_string()).collect(),
                    });
                }
            }
        }
        found
    }

    /// Nested document of `[TRANSLATE: key]` placeholders for every key `lang`
    /// lacks, or `None` when it lacks nothing.
    pub fn missing_template(&self, lang: &str) -> Option<Value> {
        let keys = self.keys.get(lang)?;
        let mut template = Map::new();
        for key in self.all_keys() {
            if !keys.contains(key) {
                set_nested(&mut template, key, Value::String(format!("[TRANSLATE: {}]", key)));
            }
        }
        (!template.is_empty()).then_some(Value::Object(template))
    }

    /// Writes `missing_<lang>.json` into `out_dir` for each incomplete language.
    pub fn export_missing(&self, out_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
        let mut written = Vec::new();
        for lang in self.translations.keys() {
            if let Some(template) = self.missing_template(lang) {
                let path = out_dir.as_ref().join(format!("missing_{}.json", lang));
                fs::write(&path, serde_json::to_string_pretty(&template)?)?;
                log::info!("{}: missing keys exported", path.display());
                written.push(path);
            }
        }
        Ok(written)
    }
}

/// Dotted paths of every non-object value.
pub fn flatten_keys(doc: &Value) -> Vec<String> {
    fn walk(value: &Value, prefix: &str, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path =
                        if prefix.is_empty() { key.clone() } else { format!("{}.{}", prefix, key) };
                    walk(child, &path, out);
                }
            }
            _ => out.push(prefix.to_string()),
        }
    }

    let mut out = Vec::new();
    if let Value::Object(_) = doc {
        walk(doc, "", &mut out);
    }
    out
}

/// Whether an untranslated-looking value is fine to share across languages:
/// short strings, upper-case codes, and anything naming a technical term.
pub fn is_valid_identical(value: &str) -> bool {
    if value.chars().count() <= 5 {
        return true;
    }

    let stripped: String = value.chars().filter(|c| *c != '_' && *c != '-').collect();
    let alnum = !stripped.is_empty() && stripped.chars().all(char::is_alphanumeric);
    let upper = value.chars().any(char::is_uppercase) && !value.chars().any(char::is_lowercase);
    if alnum && upper {
        return true;
    }

    TECHNICAL_TERMS.iter().any(|term| value.contains(term))
}

fn leaf<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    let value = key.split('.').try_fold(doc, |node, part| node.get(part))?;
    (!value.is_object()).then_some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Object(_) => false,
    }
}

fn set_nested(root: &mut Map<String, Value>, key: &str, value: Value) {
    let mut parts: Vec<&str> = key.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut node = root;
    for part in parts {
        let entry = node.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    node.insert(last.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checker() -> TranslationChecker {
        TranslationChecker::from_documents(BTreeMap::from([
            (
                "it".to_string(),
                json!({
                    "meta": {"language_name": "Italiano"},
                    "header": {"title": "Stockview Dashboard", "subtitle": "Dati impianto"},
                    "search": {"clear": "Cancella"},
                    "table": {"row_number": "#"}
                }),
            ),
            (
                "en".to_string(),
                json!({
                    "meta": {"language_name": "English"},
                    "header": {"title": "Stockview Dashboard", "subtitle": "Plant data"},
                    "table": {"row_number": "#"},
                    "only_en": "Extra"
                }),
            ),
        ]))
    }

    #[test]
    fn flattens_nested_keys() {
        let mut keys = flatten_keys(&json!({"a": {"b": 1, "c": {"d": "x"}}, "e": "y"}));
        keys.sort();
        assert_eq!(keys, ["a.b", "a.c.d", "e"]);
    }

    #[test]
    fn completeness_against_union_and_reference() {
        let reports = checker().completeness("it");
        let en = reports.iter().find(|r| r.language == "en").unwrap();
        let it = reports.iter().find(|r| r.language == "it").unwrap();

        assert_eq!(en.missing, ["search.clear"]);
        assert_eq!(en.extra, ["only_en"]);
        assert_eq!(it.missing, ["only_en"]);
        assert!(it.extra.is_empty());
        assert!(!en.is_complete());
    }

    #[test]
    fn identical_values_skip_exempt_strings() {
        let found = checker().identical_values("it");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "header.title");
        assert_eq!(found[0].languages, ["en", "it"]);
    }

    #[test]
    fn exemption_heuristics() {
        assert!(is_valid_identical("#"));
        assert!(is_valid_identical("Top 1"));
        assert!(is_valid_identical("HOST_IMPORT"));
        assert!(is_valid_identical("XML Content"));
        assert!(is_valid_identical("Order ID lookup"));
        assert!(!is_valid_identical("Dashboard Custom"));
        assert!(!is_valid_identical("Stockview"));
    }

    #[test]
    fn missing_template_is_nested() {
        let checker = checker();
        let en = json!({"search": {"clear": "[TRANSLATE: search.clear]"}});
        assert_eq!(checker.missing_template("en"), Some(en));
        let it = json!({"only_en": "[TRANSLATE: only_en]"});
        assert_eq!(checker.missing_template("it"), Some(it));
    }

    #[test]
    fn export_writes_one_file_per_incomplete_language() {
        let dir = tempfile::tempdir().unwrap();
        let written = checker().export_missing(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("missing_en.json").exists());
    }

    #[test]
    fn statistics_use_language_name() {
        let stats = checker().statistics();
        let it = stats.iter().find(|s| s.language == "it").unwrap();
        assert_eq!(it.language_name, "Italiano");
        assert_eq!(it.keys, 5);
        assert!(it.size_kb > 0.0);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TranslationChecker::load(dir.path()).is_err());
    }
}
