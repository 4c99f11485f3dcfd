//! Page rendering: markup conversion plus template binding.

use std::path::{Component, Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};
use minijinja::{context, Value};
use serde::Serialize;

use folio_content::{Document, MarkupConverter};

use crate::templates::{TemplateSet, DEFAULT_TEMPLATE, LISTING_TEMPLATE};

/// Site-level values available to every template as `site`.
#[derive(Debug, Clone, Serialize)]
pub struct SiteContext {
    /// Site title
    pub title: String,
    /// Base URL, always ending in `/`
    pub base_url: String,
}

impl SiteContext {
    pub fn new(title: impl Into<String>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            title: title.into(),
            base_url,
        }
    }
}

/// How documents map to templates and output paths.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Template for documents that do not name one
    pub default_template: String,

    /// Write `post.md` as `post/index.html` instead of `post.html`
    pub pretty_urls: bool,

    /// strftime format for `date_formatted`
    pub date_format: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            default_template: DEFAULT_TEMPLATE.to_string(),
            pretty_urls: false,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

/// A fully rendered page, ready for the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Output path relative to the output root
    pub relative_path: PathBuf,

    /// Final HTML
    pub html: String,
}

/// What site-wide artifacts need to know about a rendered page.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub title: String,
    pub url: String,
    pub date: Option<String>,
    pub date_formatted: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Plain-text opening of the body
    pub summary: String,
    /// Publication date, for ordering
    #[serde(skip)]
    pub published: Option<DateTime<FixedOffset>>,
}

/// Errors that can occur while rendering a page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template `{template}` is missing required slot `{slot}`")]
    MissingTemplateSlot {
        template: String,
        slot: &'static str,
    },

    #[error("template `{0}` not found")]
    UnknownTemplate(String),

    #[error("failed to render template `{template}`: {source}")]
    Template {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("invalid date format `{0}`")]
    InvalidDateFormat(String),
}

/// Turns documents into rendered pages.
///
/// Holds only read-only state, so one renderer is shared across worker
/// threads.
pub struct Renderer {
    converter: Box<dyn MarkupConverter>,
    templates: TemplateSet,
    site: SiteContext,
    options: RenderOptions,
}

impl Renderer {
    pub fn new(
        converter: Box<dyn MarkupConverter>,
        templates: TemplateSet,
        site: SiteContext,
        options: RenderOptions,
    ) -> Result<Self, RenderError> {
        if StrftimeItems::new(&options.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(RenderError::InvalidDateFormat(options.date_format));
        }

        Ok(Self {
            converter,
            templates,
            site,
            options,
        })
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn site(&self) -> &SiteContext {
        &self.site
    }

    /// Output path of a document, relative to the output root.
    ///
    /// `posts/hello.md` becomes `posts/hello.html`, or `posts/hello/index.html`
    /// with pretty URLs. The `slug` front matter key replaces the file stem.
    pub fn output_path(&self, doc: &Document) -> PathBuf {
        let parent = doc.relative_path().parent().unwrap_or(Path::new(""));
        let stem = doc.stem();

        if self.options.pretty_urls && stem != "index" {
            parent.join(stem).join("index.html")
        } else {
            parent.join(format!("{stem}.html"))
        }
    }

    /// Public URL for an output path.
    pub fn url_for(&self, relative_path: &Path) -> String {
        let mut path = relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        if self.options.pretty_urls {
            if path == "index.html" {
                path.clear();
            } else if let Some(dir) = path.strip_suffix("/index.html") {
                path = format!("{dir}/");
            }
        }

        format!("{}{}", self.site.base_url, path)
    }

    /// Render a document through its template.
    pub fn render(&self, doc: &Document) -> Result<RenderedPage, RenderError> {
        let template = doc.template().unwrap_or(&self.options.default_template);
        self.check_slots(template)?;

        let relative_path = self.output_path(doc);
        let url = self.url_for(&relative_path);
        let body = self.converter.to_html(doc.body());
        let toc = self.converter.table_of_contents(doc.body());
        let frontmatter = doc.frontmatter();

        let ctx = context! {
            title => doc.title(),
            body => Value::from_safe_string(body),
            date => doc.date().map(|d| d.to_rfc3339()),
            date_formatted => doc.date().map(|d| d.format(&self.options.date_format).to_string()),
            draft => doc.is_draft(),
            description => &frontmatter.description,
            tags => &frontmatter.tags,
            extra => &frontmatter.extra,
            toc => &toc,
            url => &url,
            site => &self.site,
        };

        let html = self
            .templates
            .render(template, ctx)
            .map_err(|source| RenderError::Template {
                template: template.to_string(),
                source,
            })?;

        Ok(RenderedPage { relative_path, html })
    }

    /// Summary of a document for listings, the sitemap and the search index.
    pub fn summarize(&self, doc: &Document) -> PageSummary {
        let frontmatter = doc.frontmatter();

        PageSummary {
            title: doc.title().to_string(),
            url: self.url_for(&self.output_path(doc)),
            date: doc.date().map(|d| d.to_rfc3339()),
            date_formatted: doc
                .date()
                .map(|d| d.format(&self.options.date_format).to_string()),
            description: frontmatter.description.clone(),
            tags: frontmatter.tags.clone(),
            summary: plain_summary(doc.body()),
            published: doc.date().copied(),
        }
    }

    /// Render the post listing, if the template set has a listing template.
    pub fn render_listing(&self, pages: &[PageSummary]) -> Result<Option<RenderedPage>, RenderError> {
        if !self.templates.contains(LISTING_TEMPLATE) {
            return Ok(None);
        }

        let ctx = context! {
            title => &self.site.title,
            body => Value::from_safe_string(String::new()),
            pages => pages,
            url => &self.site.base_url,
            site => &self.site,
        };

        let html = self
            .templates
            .render(LISTING_TEMPLATE, ctx)
            .map_err(|source| RenderError::Template {
                template: LISTING_TEMPLATE.to_string(),
                source,
            })?;

        Ok(Some(RenderedPage {
            relative_path: PathBuf::from(LISTING_TEMPLATE),
            html,
        }))
    }

    fn check_slots(&self, template: &str) -> Result<(), RenderError> {
        if !self.templates.contains(template) {
            return Err(RenderError::UnknownTemplate(template.to_string()));
        }

        let missing = self
            .templates
            .missing_slots(template)
            .map_err(|source| RenderError::Template {
                template: template.to_string(),
                source,
            })?;

        match missing.first() {
            Some(slot) => Err(RenderError::MissingTemplateSlot {
                template: template.to_string(),
                slot: *slot,
            }),
            None => Ok(()),
        }
    }
}

/// First few prose lines of a Markdown body, headings and fences skipped.
fn plain_summary(body: &str) -> String {
    let mut in_fence = false;

    body.lines()
        .map(str::trim)
        .filter(|line| {
            if line.starts_with("```") {
                in_fence = !in_fence;
                return false;
            }
            !in_fence && !line.is_empty() && !line.starts_with('#')
        })
        .take(10)
        .collect::<Vec<_>>()
        .join(" ")
}
