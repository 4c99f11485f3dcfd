//! Markup to HTML conversion.
//!
//! Conversion sits behind [`MarkupConverter`] so the rest of the pipeline
//! only ever sees "text in, HTML out".

use std::collections::HashSet;

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;

/// A table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Heading text
    pub title: String,
    /// Anchor ID
    pub id: String,
    /// Heading level (1-6)
    pub level: u8,
}

/// Errors raised while configuring a converter.
#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("unknown markdown extension: {0}")]
    UnknownExtension(String),
}

/// Converts a document body to an HTML fragment.
///
/// Implementations must be pure: the same input always yields the same
/// output.
pub trait MarkupConverter: Send + Sync {
    /// Converter identifier (e.g., "markdown")
    fn name(&self) -> &'static str;

    /// Convert markup source to an HTML fragment.
    fn to_html(&self, source: &str) -> String;

    /// Headings of the document, with the ids `to_html` assigns them.
    fn table_of_contents(&self, _source: &str) -> Vec<TocEntry> {
        Vec::new()
    }
}

/// CommonMark converter backed by pulldown-cmark.
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    options: Options,
}

impl MarkdownConverter {
    /// Extensions enabled when none are configured.
    pub const DEFAULT_EXTENSIONS: &'static [&'static str] =
        &["tables", "footnotes", "strikethrough", "tasklists"];

    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS,
        }
    }

    /// Build a converter with exactly the named extensions enabled.
    pub fn with_extensions<S: AsRef<str>>(extensions: &[S]) -> Result<Self, MarkupError> {
        let mut options = Options::empty();
        for extension in extensions {
            match extension.as_ref() {
                "tables" => options.insert(Options::ENABLE_TABLES),
                "footnotes" => options.insert(Options::ENABLE_FOOTNOTES),
                "strikethrough" => options.insert(Options::ENABLE_STRIKETHROUGH),
                "tasklists" => options.insert(Options::ENABLE_TASKLISTS),
                "heading_attributes" => options.insert(Options::ENABLE_HEADING_ATTRIBUTES),
                "smart_punctuation" => options.insert(Options::ENABLE_SMART_PUNCTUATION),
                other => return Err(MarkupError::UnknownExtension(other.to_string())),
            }
        }

        Ok(Self { options })
    }

    fn events<'a>(&self, source: &'a str) -> Vec<Event<'a>> {
        Parser::new_ext(source, self.options).collect()
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupConverter for MarkdownConverter {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn to_html(&self, source: &str) -> String {
        let events = self.events(source);
        let mut ids = headings(&events).into_iter().map(|entry| entry.id);

        // Give every heading without an explicit id the one the TOC uses
        let events = events.into_iter().map(|event| match event {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                let assigned = ids.next();
                let id = id.or_else(|| assigned.map(CowStr::from));
                Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                })
            }
            other => other,
        });

        let mut html_output = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut html_output, events);
        html_output
    }

    fn table_of_contents(&self, source: &str) -> Vec<TocEntry> {
        headings(&self.events(source))
    }
}

/// Collect headings with unique ids, in document order.
fn headings(events: &[Event<'_>]) -> Vec<TocEntry> {
    let mut toc = Vec::new();
    // Explicit `{#id}`s are reserved up front so generated ids avoid them
    let mut used: HashSet<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
            _ => None,
        })
        .collect();
    let mut current: Option<(u8, Option<String>, String)> = None; // (level, explicit id, text)

    for event in events {
        match event {
            Event::Start(Tag::Heading { level, id, .. }) => {
                current = Some((*level as u8, id.as_ref().map(|i| i.to_string()), String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, ref mut title)) = current {
                    title.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, explicit, title)) = current.take() {
                    let id = match explicit {
                        Some(id) => id,
                        None => unique_id(&slugify(&title), &used),
                    };
                    used.insert(id.clone());
                    toc.push(TocEntry { title, id, level });
                }
            }
            _ => {}
        }
    }

    toc
}

fn unique_id(base: &str, used: &HashSet<String>) -> String {
    let base = if base.is_empty() { "section" } else { base };
    let mut id = base.to_string();
    let mut suffix = 1;
    while used.contains(&id) {
        id = format!("{}-{}", base, suffix);
        suffix += 1;
    }
    id
}

/// Convert a heading to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_text_in_paragraph() {
        let html = MarkdownConverter::new().to_html("hello");

        assert_eq!(html, "<p>hello</p>\n");
    }

    #[test]
    fn assigns_heading_ids() {
        let html = MarkdownConverter::new().to_html("# Hello World\n\n## Hello World\n");

        assert!(html.contains(r#"<h1 id="hello-world">Hello World</h1>"#));
        assert!(html.contains(r#"<h2 id="hello-world-1">Hello World</h2>"#));
    }

    #[test]
    fn generated_ids_avoid_later_explicit_ids() {
        let converter = MarkdownConverter::with_extensions(&["heading_attributes"]).unwrap();

        let html = converter.to_html("# Intro\n\n# Other {#intro}\n");

        assert!(html.contains(r#"<h1 id="intro-1">Intro</h1>"#));
        assert!(html.contains(r#"<h1 id="intro">Other</h1>"#));
        let ids: Vec<_> = converter
            .table_of_contents("# Intro\n\n# Other {#intro}\n")
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, vec!["intro-1", "intro"]);
    }

    #[test]
    fn conversion_is_deterministic() {
        let converter = MarkdownConverter::new();
        let source = "# Title\n\nSome *text* with `code`.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";

        assert_eq!(converter.to_html(source), converter.to_html(source));
    }

    #[test]
    fn extracts_table_of_contents() {
        let source = "# Ownership\n\ntext\n\n## The `Drop` trait\n\n## Ownership\n";

        let toc = MarkdownConverter::new().table_of_contents(source);

        assert_eq!(
            toc,
            vec![
                TocEntry {
                    title: "Ownership".to_string(),
                    id: "ownership".to_string(),
                    level: 1,
                },
                TocEntry {
                    title: "The Drop trait".to_string(),
                    id: "the-drop-trait".to_string(),
                    level: 2,
                },
                TocEntry {
                    title: "Ownership".to_string(),
                    id: "ownership-1".to_string(),
                    level: 2,
                },
            ]
        );
    }

    #[test]
    fn keeps_explicit_heading_ids() {
        let converter = MarkdownConverter::with_extensions(&["heading_attributes"]).unwrap();

        let html = converter.to_html("# Intro {#start}\n\n# Next\n");

        assert!(html.contains(r#"<h1 id="start">Intro</h1>"#));
        assert!(html.contains(r#"<h1 id="next">Next</h1>"#));
    }

    #[test]
    fn rejects_unknown_extension() {
        let result = MarkdownConverter::with_extensions(&["not_a_real_extension"]);

        assert!(matches!(result, Err(MarkupError::UnknownExtension(_))));
    }

    #[test]
    fn tables_need_their_extension() {
        let source = "| a |\n|---|\n| 1 |\n";
        let plain = MarkdownConverter::with_extensions::<&str>(&[]).unwrap();

        assert!(MarkdownConverter::new().to_html(source).contains("<table>"));
        assert!(!plain.to_html(source).contains("<table>"));
    }

    #[test]
    fn slugify_works() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("API Reference"), "api-reference");
        assert_eq!(slugify("Button (Primary)"), "button-primary");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
    }
}
