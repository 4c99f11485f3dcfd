//! Front matter extraction and parsing.
//!
//! A document starts with a metadata block enclosed in a delimiter line:
//! `+++` for TOML, `---` for YAML. Both are normalised to JSON values before
//! the typed fields are pulled out, so the two formats share one set of
//! field rules.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Front matter syntax, selected by the opening delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `+++` delimited TOML
    Toml,
    /// `---` delimited YAML
    Yaml,
}

impl Format {
    /// The delimiter line that opens and closes a block of this format.
    pub fn delimiter(self) -> &'static str {
        match self {
            Self::Toml => "+++",
            Self::Yaml => "---",
        }
    }

    fn from_line(line: &str) -> Option<Self> {
        match line.trim_end() {
            "+++" => Some(Self::Toml),
            "---" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Parsed front matter of a document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Frontmatter {
    /// Page title (required)
    pub title: String,

    /// Publish timestamp
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date: Option<DateTime<FixedOffset>>,

    /// Excluded from published output when set
    #[serde(default)]
    pub draft: bool,

    /// Template name override
    #[serde(default)]
    pub template: Option<String>,

    /// Output file stem override
    #[serde(default)]
    pub slug: Option<String>,

    /// Page description for previews
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Any other keys, passed through to templates untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Errors that can occur when parsing front matter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("missing front matter block, expected `+++` or `---` on the first line")]
    Missing,

    #[error("unclosed front matter block, missing closing `{0}`")]
    Unclosed(&'static str),

    #[error("invalid TOML in front matter: {0}")]
    InvalidToml(String),

    #[error("invalid YAML in front matter: {0}")]
    InvalidYaml(String),

    #[error("front matter must be a table of key/value pairs")]
    NotATable,

    #[error("invalid front matter field: {0}")]
    InvalidField(String),
}

/// Split a document into its front matter and body, and parse the front matter.
///
/// Returns the parsed front matter and the body text that follows the
/// closing delimiter line.
pub fn extract_frontmatter(source: &str) -> Result<(Frontmatter, &str), FrontmatterError> {
    let (format, block, body) = split(source)?;
    let fields = match format {
        Format::Toml => parse_toml(block)?,
        Format::Yaml => parse_yaml(block)?,
    };

    let frontmatter = serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| FrontmatterError::InvalidField(e.to_string()))?;

    Ok((frontmatter, body))
}

/// Locate the delimited block. Returns the format, the raw block and the body.
fn split(source: &str) -> Result<(Format, &str, &str), FrontmatterError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let mut lines = source.split_inclusive('\n');
    let opening = lines.next().ok_or(FrontmatterError::Missing)?;
    let format = Format::from_line(opening).ok_or(FrontmatterError::Missing)?;

    let block_start = opening.len();
    let mut offset = block_start;
    for line in lines {
        if Format::from_line(line) == Some(format) {
            let block = &source[block_start..offset];
            let body = &source[offset + line.len()..];
            return Ok((format, block, body));
        }
        offset += line.len();
    }

    Err(FrontmatterError::Unclosed(format.delimiter()))
}

fn parse_toml(block: &str) -> Result<serde_json::Map<String, serde_json::Value>, FrontmatterError> {
    let table: toml::Table =
        toml::from_str(block).map_err(|e| FrontmatterError::InvalidToml(e.message().to_string()))?;

    Ok(table
        .into_iter()
        .map(|(key, value)| (key, toml_to_json(value)))
        .collect())
}

fn parse_yaml(block: &str) -> Result<serde_json::Map<String, serde_json::Value>, FrontmatterError> {
    if block.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }

    let value: serde_json::Value =
        serde_yaml::from_str(block).map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        _ => Err(FrontmatterError::NotATable),
    }
}

/// TOML date-times become their canonical string form.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    Option::<String>::deserialize(deserializer)?
        .map(|text| parse_date(&text).map_err(D::Error::custom))
        .transpose()
}

/// Parse a publish date.
///
/// Accepts RFC 3339 (`2025-01-01T00:00:00Z`), a local date-time without an
/// offset (`2025-01-01T09:30:00`, taken as UTC) and a bare date
/// (`2025-01-01`, midnight UTC).
pub fn parse_date(text: &str) -> Result<DateTime<FixedOffset>, String> {
    let text = text.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive).into());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).into())
        .ok_or_else(|| format!("`{text}` is not an ISO-8601 date or date-time"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_toml_frontmatter() {
        let source = r#"+++
title = "Example"
date = 2025-01-01T00:00:00Z
draft = false
+++
hello
"#;

        let (fm, body) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.title, "Example");
        assert_eq!(
            fm.date.unwrap().to_rfc3339(),
            "2025-01-01T00:00:00+00:00".to_string()
        );
        assert!(!fm.draft);
        assert_eq!(body, "hello\n");
    }

    #[test]
    fn extracts_yaml_frontmatter() {
        let source = "---\ntitle: Borrowing\ndate: 2024-03-09\ndraft: true\ntags:\n  - rust\n---\n# Borrowing\n";

        let (fm, body) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.title, "Borrowing");
        assert!(fm.draft);
        assert_eq!(fm.tags, vec!["rust".to_string()]);
        assert_eq!(fm.date.unwrap().to_rfc3339(), "2024-03-09T00:00:00+00:00");
        assert_eq!(body, "# Borrowing\n");
    }

    #[test]
    fn keeps_unknown_keys_as_extra() {
        let source = "+++\ntitle = \"Notes\"\nauthor = \"sam\"\n[links]\nrepo = \"x\"\n+++\n";

        let (fm, _) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.extra["author"], serde_json::json!("sam"));
        assert_eq!(fm.extra["links"], serde_json::json!({ "repo": "x" }));
    }

    #[test]
    fn errors_on_missing_frontmatter() {
        let result = extract_frontmatter("# Just Markdown\n\nNo front matter here.");

        assert!(matches!(result, Err(FrontmatterError::Missing)));
    }

    #[test]
    fn errors_on_unclosed_frontmatter() {
        let result = extract_frontmatter("+++\ntitle = \"Test\"\n# No closing");

        assert!(matches!(result, Err(FrontmatterError::Unclosed("+++"))));
    }

    #[test]
    fn mismatched_delimiters_do_not_close() {
        let result = extract_frontmatter("+++\ntitle = \"Test\"\n---\nbody");

        assert!(matches!(result, Err(FrontmatterError::Unclosed("+++"))));
    }

    #[test]
    fn errors_on_invalid_toml() {
        let result = extract_frontmatter("+++\ntitle = [unclosed\n+++\n");

        assert!(matches!(result, Err(FrontmatterError::InvalidToml(_))));
    }

    #[test]
    fn errors_on_wrong_field_type() {
        let result = extract_frontmatter("+++\ntitle = \"T\"\ndraft = \"maybe\"\n+++\n");

        assert!(matches!(result, Err(FrontmatterError::InvalidField(_))));
    }

    #[test]
    fn errors_on_unparseable_date() {
        let result = extract_frontmatter("---\ntitle: T\ndate: last tuesday\n---\n");

        let err = result.unwrap_err();
        assert!(matches!(err, FrontmatterError::InvalidField(_)));
        assert!(err.to_string().contains("last tuesday"));
    }

    #[test]
    fn errors_on_missing_title() {
        let result = extract_frontmatter("+++\ndraft = true\n+++\n");

        assert!(matches!(result, Err(FrontmatterError::InvalidField(_))));
    }

    #[test]
    fn errors_on_scalar_yaml() {
        let result = extract_frontmatter("---\njust a string\n---\n");

        assert!(matches!(result, Err(FrontmatterError::NotATable)));
    }

    #[test]
    fn tolerates_bom_and_crlf() {
        let source = "\u{feff}+++\r\ntitle = \"Windows\"\r\n+++\r\nbody\r\n";

        let (fm, body) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.title, "Windows");
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn parses_date_variants() {
        assert_eq!(
            parse_date("2025-01-01T10:00:00+02:00").unwrap().to_rfc3339(),
            "2025-01-01T10:00:00+02:00"
        );
        assert_eq!(
            parse_date("2025-01-01T10:00:00").unwrap().to_rfc3339(),
            "2025-01-01T10:00:00+00:00"
        );
        assert_eq!(
            parse_date("2025-01-01").unwrap().to_rfc3339(),
            "2025-01-01T00:00:00+00:00"
        );
        assert!(parse_date("01/02/2025").is_err());
    }
}
