//! # Formatter Engine
//!
//! Turns a raw cell value into a [`RenderDescriptor`]: the text to display, a
//! CSS class, and kind-specific extras such as expandable content. Rendering is
//! a pure function of its inputs.
//!
//! Column formatter resolution, used by [`TableFormatter`]:
//! explicit column override > schema-inferred suggestion > `text`.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    model::{Row, TableSchema},
    overrides::ColumnOverride,
};

/// Display text used for null and empty cells.
pub const EMPTY_DISPLAY: &str = "—";

const DEFAULT_MAX_LENGTH: usize = 100;
const DEFAULT_DECIMALS: usize = 2;

const STATUS_COLORS: &[(&str, &str)] = &[
    ("COMPL", "green"),
    ("COMPLETED", "green"),
    ("SUCCESS", "green"),
    ("OK", "green"),
    ("WAIT", "yellow"),
    ("WAITING", "yellow"),
    ("PENDING", "yellow"),
    ("ERR", "red"),
    ("ERROR", "red"),
    ("FAILED", "red"),
    ("CANCEL", "gray"),
    ("CANCELLED", "gray"),
];

// ============================================================================
// Formatter Kind
// ============================================================================

/// How a column's values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormatterKind {
    StatusBadge,
    ExpandableCode,
    Datetime,
    MonospaceId,
    MonospaceCode,
    Number,
    Decimal,
    Boolean,
    #[default]
    Text,
}

impl FormatterKind {
    pub const ALL: [FormatterKind; 9] = [
        FormatterKind::StatusBadge,
        FormatterKind::ExpandableCode,
        FormatterKind::Datetime,
        FormatterKind::MonospaceId,
        FormatterKind::MonospaceCode,
        FormatterKind::Number,
        FormatterKind::Decimal,
        FormatterKind::Boolean,
        FormatterKind::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatterKind::StatusBadge => "status_badge",
            FormatterKind::ExpandableCode => "expandable_code",
            FormatterKind::Datetime => "datetime",
            FormatterKind::MonospaceId => "monospace_id",
            FormatterKind::MonospaceCode => "monospace_code",
            FormatterKind::Number => "number",
            FormatterKind::Decimal => "decimal",
            FormatterKind::Boolean => "boolean",
            FormatterKind::Text => "text",
        }
    }

    /// Parses a formatter tag. Unknown tags fall back to `Text`.
    pub fn parse(tag: &str) -> Self {
        Self::ALL.into_iter().find(|k| k.as_str() == tag.trim()).unwrap_or(FormatterKind::Text)
    }

    /// Renders a non-empty value.
    pub fn render(
        &self,
        value: &Value,
        column: &str,
        config: Option<&ColumnOverride>,
    ) -> RenderDescriptor {
        match self {
            FormatterKind::StatusBadge => render_status(value, config),
            FormatterKind::ExpandableCode => render_expandable(value, column),
            FormatterKind::Datetime => render_datetime(value),
            FormatterKind::MonospaceId => {
                RenderDescriptor::plain(display(value), "monospace-id", value)
            }
            FormatterKind::MonospaceCode => {
                RenderDescriptor::plain(display(value), "monospace-code", value)
            }
            FormatterKind::Number => render_number(value),
            FormatterKind::Decimal => render_decimal(value, config),
            FormatterKind::Boolean => render_boolean(value),
            FormatterKind::Text => render_text(value, config),
        }
    }
}

impl fmt::Display for FormatterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FormatterKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FormatterKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(FormatterKind::parse(&tag))
    }
}

// ============================================================================
// Render Descriptor
// ============================================================================

/// What the presentation layer needs to draw one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderDescriptor {
    pub value: String,
    pub css_class: String,
    pub raw: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub is_expandable: bool,
    pub is_status: bool,
}

impl RenderDescriptor {
    pub fn plain(value: impl Into<String>, css_class: impl Into<String>, raw: &Value) -> Self {
        Self {
            value: value.into(),
            css_class: css_class.into(),
            raw: raw.clone(),
            full_content: None,
            full_text: None,
            timestamp: None,
            is_expandable: false,
            is_status: false,
        }
    }

    /// The fixed descriptor for null and empty values.
    pub fn empty() -> Self {
        Self::plain(EMPTY_DISPLAY, "empty-cell", &Value::Null)
    }
}

/// Formats a single value. Null and empty strings short-circuit to
/// [`RenderDescriptor::empty`] before the kind is looked at.
pub fn format_value(
    value: &Value,
    kind: FormatterKind,
    column: &str,
    config: Option<&ColumnOverride>,
) -> RenderDescriptor {
    match value {
        Value::Null => RenderDescriptor::empty(),
        Value::String(s) if s.is_empty() => RenderDescriptor::empty(),
        _ => kind.render(value, column, config),
    }
}

/// Python-like textual form of a raw value.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Per-kind Rendering
// ============================================================================

fn render_status(value: &Value, config: Option<&ColumnOverride>) -> RenderDescriptor {
    let text = display(value);
    let key = text.to_uppercase();

    let configured = config
        .and_then(|c| c.status_colors.iter().find(|(k, _)| k.to_uppercase() == key))
        .map(|(_, color)| color.as_str());
    let color = configured
        .or_else(|| STATUS_COLORS.iter().find(|(k, _)| *k == key).map(|(_, c)| *c))
        .unwrap_or("blue");

    let css_class = format!("status-badge status-{}", color);
    let mut descriptor = RenderDescriptor::plain(text, css_class, value);
    descriptor.is_status = true;
    descriptor
}

fn render_expandable(value: &Value, column: &str) -> RenderDescriptor {
    let text = display(value);
    let looks_like_markup =
        text.trim_start().starts_with('<') || column.to_uppercase().contains("XML");

    let pretty = looks_like_markup
        .then(|| pretty_xml(&text))
        .flatten()
        .or_else(|| pretty_json(value, &text))
        .unwrap_or_else(|| text.clone());

    let lines: Vec<&str> = pretty.split('\n').collect();
    let mut preview = lines[..lines.len().min(2)].join("\n");
    if lines.len() > 2 {
        preview.push_str("...");
    }

    let mut descriptor = RenderDescriptor::plain(preview, "code-expandable", value);
    descriptor.full_content = Some(pretty);
    descriptor.is_expandable = true;
    descriptor
}

fn render_datetime(value: &Value) -> RenderDescriptor {
    let Value::String(text) = value else {
        return RenderDescriptor::plain(display(value), "datetime", value);
    };

    let Some((wall, timestamp)) = parse_datetime(text.trim()) else {
        return RenderDescriptor::plain(text.clone(), "datetime", value);
    };

    let shown = wall.format("%Y-%m-%d %H:%M:%S").to_string();
    let mut descriptor = RenderDescriptor::plain(shown, "datetime", value);
    descriptor.timestamp = Some(timestamp);
    descriptor
}

fn render_number(value: &Value) -> RenderDescriptor {
    let parsed = match value {
        Value::Number(n) => {
            n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    };

    let text = match parsed {
        Some(n) => {
            let grouped = group_thousands(&n.unsigned_abs().to_string(), '.');
            if n < 0 { format!("-{}", grouped) } else { grouped }
        }
        None => display(value),
    };
    RenderDescriptor::plain(text, "number", value)
}

fn render_decimal(value: &Value, config: Option<&ColumnOverride>) -> RenderDescriptor {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|f| f.is_finite());

    let text = match parsed {
        Some(num) => {
            let decimals = config.and_then(|c| c.decimals).unwrap_or(DEFAULT_DECIMALS);
            let fixed = format!("{:.*}", decimals, num.abs());
            let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
            let mut out = String::new();
            if num < 0.0 {
                out.push('-');
            }
            out.push_str(&group_thousands(int_part, '.'));
            if !frac_part.is_empty() {
                out.push(',');
                out.push_str(frac_part);
            }
            out
        }
        None => display(value),
    };
    RenderDescriptor::plain(text, "decimal", value)
}

fn render_boolean(value: &Value) -> RenderDescriptor {
    let truthiness = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    };

    match truthiness {
        Some(true) => RenderDescriptor::plain("✓", "boolean-true", value),
        Some(false) => RenderDescriptor::plain("✗", "boolean-false", value),
        None => RenderDescriptor::plain(display(value), "boolean-unknown", value),
    }
}

fn render_text(value: &Value, config: Option<&ColumnOverride>) -> RenderDescriptor {
    let text = display(value);
    let max_length = config.and_then(|c| c.max_length).unwrap_or(DEFAULT_MAX_LENGTH);

    if text.chars().count() > max_length {
        let truncated: String = text.chars().take(max_length).collect();
        let mut descriptor =
            RenderDescriptor::plain(format!("{}...", truncated), "text-truncated", value);
        descriptor.full_text = Some(text);
        return descriptor;
    }
    RenderDescriptor::plain(text, "text", value)
}

// ============================================================================
// Helpers
// ============================================================================

fn group_thousands(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Parses ISO-8601-ish text. Returns the wall-clock time to display and the
/// epoch timestamp; naive values are taken as UTC.
fn parse_datetime(text: &str) -> Option<(NaiveDateTime, f64)> {
    let aware = DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| DateTime::<FixedOffset>::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z").ok());
    if let Some(dt) = aware {
        return Some((dt.naive_local(), dt.timestamp_millis() as f64 / 1000.0));
    }

    const NAIVE_FORMATS: [&str; 4] =
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Some((naive, naive.and_utc().timestamp_millis() as f64 / 1000.0))
}

fn pretty_json(value: &Value, text: &str) -> Option<String> {
    match value {
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(value).ok(),
        _ => serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok()),
    }
}

enum XmlToken<'a> {
    Open { tag: &'a str, name: &'a str },
    Close { tag: &'a str, name: &'a str },
    Empty(&'a str),
    Text(&'a str),
    Other(&'a str),
}

/// Byte offset just past the `>` that closes the tag at the start of `src`.
/// A `>` inside a quoted attribute value does not count.
fn tag_end(src: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in src.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i + 1),
            (None, _) => {}
        }
    }
    None
}

fn tokenize_xml(src: &str) -> Option<Vec<XmlToken<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = src;

    while !rest.is_empty() {
        let (token, end) = if rest.starts_with("<!--") {
            let end = rest.find("-->")? + 3;
            (XmlToken::Other(&rest[..end]), end)
        } else if rest.starts_with("<![CDATA[") {
            let end = rest.find("]]>")? + 3;
            (XmlToken::Other(&rest[..end]), end)
        } else if rest.starts_with("<?") {
            let end = rest.find("?>")? + 2;
            (XmlToken::Other(&rest[..end]), end)
        } else if rest.starts_with("<!") {
            let end = rest.find('>')? + 1;
            (XmlToken::Other(&rest[..end]), end)
        } else if rest.starts_with("</") {
            let end = tag_end(rest)?;
            let name = rest[2..end - 1].trim();
            if name.is_empty() {
                return None;
            }
            (XmlToken::Close { tag: &rest[..end], name }, end)
        } else if rest.starts_with('<') {
            let end = tag_end(rest)?;
            let inner = &rest[1..end - 1];
            let name = inner.trim_end_matches('/').split_whitespace().next()?;
            if inner.ends_with('/') {
                (XmlToken::Empty(&rest[..end]), end)
            } else {
                (XmlToken::Open { tag: &rest[..end], name }, end)
            }
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            (XmlToken::Text(&rest[..end]), end)
        };
        tokens.push(token);
        rest = &rest[end..];
    }
    Some(tokens)
}

/// Re-indents well-formed markup two spaces per level. Returns `None` when
/// tags are unbalanced, there is no root element, or there are several.
fn pretty_xml(src: &str) -> Option<String> {
    let tokens = tokenize_xml(src.trim())?;
    let mut out: Vec<String> = Vec::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut seen_root = false;
    let mut i = 0;

    while i < tokens.len() {
        let indent = "  ".repeat(stack.len());
        match &tokens[i] {
            XmlToken::Open { tag, name } => {
                if stack.is_empty() && seen_root {
                    return None;
                }
                seen_root = true;
                // <a>text</a> stays on one line
                if let (
                    Some(XmlToken::Text(text)),
                    Some(XmlToken::Close { tag: close, name: close_name }),
                ) = (tokens.get(i + 1), tokens.get(i + 2))
                {
                    if close_name == name {
                        out.push(format!("{}{}{}{}", indent, tag, text.trim(), close));
                        i += 3;
                        continue;
                    }
                }
                out.push(format!("{}{}", indent, tag));
                stack.push(*name);
            }
            XmlToken::Close { tag, name } => {
                if stack.pop()? != *name {
                    return None;
                }
                out.push(format!("{}{}", "  ".repeat(stack.len()), tag));
            }
            XmlToken::Empty(tag) => {
                if stack.is_empty() {
                    if seen_root {
                        return None;
                    }
                    seen_root = true;
                }
                out.push(format!("{}{}", indent, tag));
            }
            XmlToken::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if stack.is_empty() {
                        return None;
                    }
                    out.push(format!("{}{}", indent, text));
                }
            }
            XmlToken::Other(tag) => out.push(format!("{}{}", indent, tag)),
        }
        i += 1;
    }

    (stack.is_empty() && seen_root).then(|| out.join("\n"))
}

// ============================================================================
// Table Formatter
// ============================================================================

/// A formatted row: column name -> descriptor, in row order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormattedRow {
    cells: Vec<(String, RenderDescriptor)>,
}

impl FormattedRow {
    pub fn get(&self, column: &str) -> Option<&RenderDescriptor> {
        self.cells.iter().find(|(name, _)| name == column).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RenderDescriptor)> {
        self.cells.iter().map(|(name, d)| (name.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for FormattedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, descriptor) in &self.cells {
            map.serialize_entry(name, descriptor)?;
        }
        map.end()
    }
}

/// Formats whole result sets for one table or custom view.
pub struct TableFormatter<'a> {
    schema: Option<&'a TableSchema>,
    overrides: &'a HashMap<String, ColumnOverride>,
    global_colors: &'a BTreeMap<String, String>,
}

impl<'a> TableFormatter<'a> {
    pub fn new(
        schema: Option<&'a TableSchema>,
        overrides: &'a HashMap<String, ColumnOverride>,
        global_colors: &'a BTreeMap<String, String>,
    ) -> Self {
        Self { schema, overrides, global_colors }
    }

    /// Resolves the formatter for a column.
    pub fn formatter_for(&self, column: &str) -> FormatterKind {
        self.overrides
            .get(column)
            .and_then(|o| o.formatter)
            .or_else(|| self.schema.and_then(|s| s.column(column)).map(|c| c.suggested_formatter))
            .unwrap_or(FormatterKind::Text)
    }

    /// Column config with install-wide status colors underneath.
    fn config_for(&self, column: &str) -> ColumnOverride {
        let mut config = self.overrides.get(column).cloned().unwrap_or_default();
        for (status, color) in self.global_colors {
            if !config.status_colors.keys().any(|k| k.eq_ignore_ascii_case(status)) {
                config.status_colors.insert(status.clone(), color.clone());
            }
        }
        config
    }

    pub fn format_rows(&self, rows: &[Row]) -> Vec<FormattedRow> {
        let Some(first) = rows.first() else {
            return Vec::new();
        };
        let plan: HashMap<&str, (FormatterKind, ColumnOverride)> = first
            .keys()
            .map(|c| (c.as_str(), (self.formatter_for(c), self.config_for(c))))
            .collect();

        rows.iter()
            .map(|row| FormattedRow {
                cells: row
                    .iter()
                    .map(|(column, value)| {
                        let descriptor = match plan.get(column.as_str()) {
                            Some((kind, config)) => {
                                format_value(value, *kind, column, Some(config))
                            }
                            None => {
                                let kind = self.formatter_for(column);
                                format_value(value, kind, column, Some(&self.config_for(column)))
                            }
                        };
                        (column.clone(), descriptor)
                    })
                    .collect(),
            })
            .collect()
    }
}
