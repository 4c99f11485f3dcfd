//! Static site builder.
//!
//! Loads every document, renders and writes each one independently, then
//! copies assets and writes site-wide artifacts. A failing document is
//! recorded in the [`BuildResult`] and the build moves on.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use folio_content::{
    walk_files, Asset, ContentLoader, Document, LoadError, MarkdownConverter, MarkupError,
};

use crate::assets::{AssetPipeline, STYLESHEET_PATH};
use crate::emitter::{EmitError, Emitter};
use crate::renderer::{PageSummary, RenderError, RenderOptions, Renderer, SiteContext};
use crate::templates::{TemplateError, TemplateSet, DEFAULT_TEMPLATE, LISTING_TEMPLATE};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Content root
    pub content_dir: PathBuf,

    /// Output root
    pub output_dir: PathBuf,

    /// Template directory (built-in theme when `None`)
    pub templates_dir: Option<PathBuf>,

    /// Directory copied verbatim into the output root, if it exists
    pub static_dir: Option<PathBuf>,

    /// Site title
    pub site_title: String,

    /// Base URL for the site
    pub base_url: String,

    /// Template for documents that do not name one
    pub default_template: String,

    /// Write `post/index.html` instead of `post.html`
    pub pretty_urls: bool,

    /// Render drafts too
    pub include_drafts: bool,

    /// Render documents on the rayon pool
    pub parallel: bool,

    /// strftime format exposed to templates as `date_formatted`
    pub date_format: String,

    /// Enabled Markdown extensions
    pub markdown_extensions: Vec<String>,

    /// Write sitemap.xml and robots.txt
    pub sitemap: bool,

    /// Write search-index.json
    pub search_index: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("public"),
            templates_dir: None,
            static_dir: None,
            site_title: "Notes".to_string(),
            base_url: "/".to_string(),
            default_template: DEFAULT_TEMPLATE.to_string(),
            pretty_urls: render.pretty_urls,
            include_drafts: false,
            parallel: true,
            date_format: render.date_format,
            markdown_extensions: MarkdownConverter::DEFAULT_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            sitemap: true,
            search_index: true,
        }
    }
}

/// What went wrong with a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Front matter absent or unparseable
    MalformedFrontMatter,
    /// Source could not be read
    Read,
    /// Document names a template that does not exist
    UnknownTemplate,
    /// Template lacks a required slot
    MissingTemplateSlot,
    /// Template failed while rendering
    Template,
    /// Two files map to the same output path
    DuplicateOutput,
    /// Output could not be written
    WriteError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedFrontMatter => "MalformedFrontMatter",
            Self::Read => "ReadError",
            Self::UnknownTemplate => "UnknownTemplate",
            Self::MissingTemplateSlot => "MissingTemplateSlot",
            Self::Template => "TemplateError",
            Self::DuplicateOutput => "DuplicateOutput",
            Self::WriteError => "WriteError",
        };
        f.write_str(name)
    }
}

/// A file that was skipped, and why.
#[derive(Debug, Clone)]
pub struct PageFailure {
    /// Source file (or output file, for write failures outside a document)
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

impl PageFailure {
    fn load(error: LoadError, content_dir: &Path) -> Self {
        let kind = match &error {
            LoadError::MalformedFrontMatter { .. } => FailureKind::MalformedFrontMatter,
            _ => FailureKind::Read,
        };
        Self {
            path: error.path().unwrap_or(content_dir).to_path_buf(),
            kind,
            message: error.to_string(),
        }
    }

    fn render(path: &Path, error: RenderError) -> Self {
        let kind = match &error {
            RenderError::MissingTemplateSlot { .. } => FailureKind::MissingTemplateSlot,
            RenderError::UnknownTemplate(_) => FailureKind::UnknownTemplate,
            _ => FailureKind::Template,
        };
        Self {
            path: path.to_path_buf(),
            kind,
            message: error.to_string(),
        }
    }

    fn duplicate(path: &Path, output: &Path, owner: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: FailureKind::DuplicateOutput,
            message: format!(
                "{} is already produced by {}",
                output.display(),
                owner.display()
            ),
        }
    }

    fn emit(path: &Path, error: EmitError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: FailureKind::WriteError,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of pages written
    pub pages: usize,

    /// Number of drafts left out
    pub drafts: usize,

    /// Number of assets copied
    pub assets: usize,

    /// Files that were skipped
    pub failures: Vec<PageFailure>,

    /// Whether the build stopped early on request
    pub cancelled: bool,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

impl BuildResult {
    /// True when no file failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Errors that stop a build before any page is processed.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to read content: {0}")]
    Content(#[from] LoadError),

    #[error("failed to load templates: {0}")]
    Templates(#[from] TemplateError),

    #[error("invalid markdown configuration: {0}")]
    Markup(#[from] MarkupError),

    #[error("invalid render configuration: {0}")]
    Render(#[from] RenderError),

    #[error("failed to prepare output directory: {0}")]
    Output(#[from] EmitError),
}

/// Shared flag that asks a running build to stop.
///
/// Checked before each document, so a page that is being written is always
/// finished first.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Output paths claimed so far, mapped to the file that produces them.
type Outputs = HashMap<PathBuf, PathBuf>;

enum PageOutcome {
    Written(PageSummary),
    Failed(PageFailure),
    Cancelled,
}

/// Static site builder.
pub struct StaticBuilder {
    config: BuildConfig,
    renderer: Renderer,
    emitter: Emitter,
    cancel: CancelFlag,
}

impl StaticBuilder {
    /// Create a new static builder, loading templates and checking options.
    pub fn new(config: BuildConfig) -> Result<Self, BuildError> {
        let templates = match &config.templates_dir {
            Some(dir) => TemplateSet::from_dir(dir)?,
            None => TemplateSet::builtin(),
        };
        tracing::debug!(
            "Templates: {}",
            templates.names().collect::<Vec<_>>().join(", ")
        );

        let converter = MarkdownConverter::with_extensions(&config.markdown_extensions)?;
        let renderer = Renderer::new(
            Box::new(converter),
            templates,
            SiteContext::new(&config.site_title, &config.base_url),
            RenderOptions {
                default_template: config.default_template.clone(),
                pretty_urls: config.pretty_urls,
                date_format: config.date_format.clone(),
            },
        )?;

        Ok(Self {
            emitter: Emitter::new(&config.output_dir),
            config,
            renderer,
            cancel: CancelFlag::new(),
        })
    }

    /// Use a cancel flag shared with the caller.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build the static site.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let loader = ContentLoader::open(&self.config.content_dir)?;
        self.emitter.prepare()?;

        let mut failures = Vec::new();
        let (documents, drafts) = self.load_documents(&loader, &mut failures);
        let (documents, mut outputs) = self.claim_output_paths(documents, &mut failures);

        tracing::info!(
            "Rendering {} document(s) from {}",
            documents.len(),
            self.config.content_dir.display()
        );

        let outcomes: Vec<PageOutcome> = if self.config.parallel {
            documents.par_iter().map(|doc| self.build_page(doc)).collect()
        } else {
            documents.iter().map(|doc| self.build_page(doc)).collect()
        };

        let mut summaries = Vec::new();
        let mut skipped = 0;
        for outcome in outcomes {
            match outcome {
                PageOutcome::Written(summary) => summaries.push(summary),
                PageOutcome::Failed(failure) => failures.push(failure),
                PageOutcome::Cancelled => skipped += 1,
            }
        }
        let pages = summaries.len();

        let cancelled = self.cancel.is_cancelled();
        let mut assets = 0;
        if cancelled {
            tracing::warn!("Build cancelled, {} document(s) not processed", skipped);
        } else {
            assets = self.copy_assets(&loader, &mut outputs, &mut failures);
            self.write_artifacts(&mut summaries, &mut outputs, &mut failures);
            self.remove_stale_output(&outputs, &mut failures);
        }

        failures.sort_by(|a, b| a.path.cmp(&b.path));
        for failure in &failures {
            tracing::warn!("{}", failure);
        }

        let duration = start.elapsed();
        tracing::info!(
            "Built {} page(s), {} asset(s), {} draft(s) skipped, {} failure(s) in {}ms",
            pages,
            assets,
            drafts,
            failures.len(),
            duration.as_millis()
        );

        Ok(BuildResult {
            pages,
            drafts,
            assets,
            failures,
            cancelled,
            duration_ms: duration.as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Drain the loader, separating drafts and recording load failures.
    fn load_documents(
        &self,
        loader: &ContentLoader,
        failures: &mut Vec<PageFailure>,
    ) -> (Vec<Document>, usize) {
        let mut documents = Vec::new();
        let mut drafts = 0;

        for result in loader.documents() {
            match result {
                Ok(doc) if doc.is_draft() && !self.config.include_drafts => {
                    tracing::debug!("Skipping draft {}", doc.relative_path().display());
                    drafts += 1;
                }
                Ok(doc) => documents.push(doc),
                Err(e) => failures.push(PageFailure::load(e, loader.root())),
            }
        }

        (documents, drafts)
    }

    /// Keep the first document for each output path; later ones fail.
    ///
    /// Returns the kept documents and the claimed output paths, mapped to
    /// the file that produces them.
    fn claim_output_paths(
        &self,
        documents: Vec<Document>,
        failures: &mut Vec<PageFailure>,
    ) -> (Vec<Document>, Outputs) {
        let mut claimed = Outputs::new();

        let kept = documents
            .into_iter()
            .filter(|doc| {
                let output = self.renderer.output_path(doc);
                match claimed.get(&output) {
                    Some(owner) => {
                        failures.push(PageFailure::duplicate(doc.source_path(), &output, owner));
                        false
                    }
                    None => {
                        claimed.insert(output, doc.source_path().to_path_buf());
                        true
                    }
                }
            })
            .collect();

        (kept, claimed)
    }

    /// Render and write one document.
    fn build_page(&self, doc: &Document) -> PageOutcome {
        if self.cancel.is_cancelled() {
            return PageOutcome::Cancelled;
        }

        let page = match self.renderer.render(doc) {
            Ok(page) => page,
            Err(e) => return PageOutcome::Failed(PageFailure::render(doc.source_path(), e)),
        };

        match self.emitter.emit(&page) {
            Ok(_) => PageOutcome::Written(self.renderer.summarize(doc)),
            Err(e) => PageOutcome::Failed(PageFailure::emit(doc.source_path(), e)),
        }
    }

    /// Copy content assets and the static directory.
    ///
    /// An asset whose path is already claimed, by a page or an earlier asset,
    /// is not copied.
    fn copy_assets(
        &self,
        loader: &ContentLoader,
        outputs: &mut Outputs,
        failures: &mut Vec<PageFailure>,
    ) -> usize {
        let mut found: Vec<Asset> = loader.assets().collect();

        if let Some(static_dir) = &self.config.static_dir {
            if static_dir.is_dir() {
                for item in walk_files(static_dir) {
                    match item {
                        Ok(asset) => found.push(asset),
                        Err(e) => failures.push(PageFailure::load(e, static_dir)),
                    }
                }
            } else {
                tracing::debug!("No static directory at {}", static_dir.display());
            }
        }

        let mut assets = Vec::with_capacity(found.len());
        for asset in found {
            match outputs.get(&asset.relative_path) {
                Some(owner) => failures.push(PageFailure::duplicate(
                    &asset.source_path,
                    &asset.relative_path,
                    owner,
                )),
                None => {
                    outputs.insert(asset.relative_path.clone(), asset.source_path.clone());
                    assets.push(asset);
                }
            }
        }

        // A stylesheet shipped with the site replaces the built-in one
        let stylesheet = Path::new(STYLESHEET_PATH);
        if self.renderer.templates().is_builtin() && !outputs.contains_key(stylesheet) {
            match AssetPipeline::write_default_css(&self.emitter) {
                Ok(_) => {
                    outputs.insert(stylesheet.to_path_buf(), stylesheet.to_path_buf());
                }
                Err(e) => failures.push(PageFailure::emit(&e.path().to_path_buf(), e)),
            }
        }

        let (copied, errors) = AssetPipeline::copy_all(&self.emitter, assets);
        failures.extend(
            errors
                .into_iter()
                .map(|e| PageFailure::emit(&e.path().to_path_buf(), e)),
        );

        copied
    }

    /// Post listing, sitemap and search index.
    ///
    /// A page or asset at the same path takes precedence over a generated file.
    fn write_artifacts(
        &self,
        summaries: &mut [PageSummary],
        outputs: &mut Outputs,
        failures: &mut Vec<PageFailure>,
    ) {
        summaries.sort_by(|a, b| {
            b.published
                .cmp(&a.published)
                .then_with(|| a.title.cmp(&b.title))
        });

        if outputs.contains_key(Path::new(LISTING_TEMPLATE)) {
            tracing::debug!("index.html is already produced, skipping the listing");
        } else {
            match self.renderer.render_listing(summaries) {
                Ok(Some(page)) => {
                    self.write_artifact(&page.relative_path, &page.html, outputs, failures)
                }
                Ok(None) => {}
                Err(e) => failures.push(PageFailure::render(Path::new(LISTING_TEMPLATE), e)),
            }
        }

        if self.config.sitemap {
            let base_url = &self.renderer.site().base_url;
            if base_url.contains("://") {
                let sitemap = self.sitemap(summaries);
                self.write_artifact(Path::new("sitemap.xml"), &sitemap, outputs, failures);
                let robots = format!("User-agent: *\nAllow: /\nSitemap: {}sitemap.xml\n", base_url);
                self.write_artifact(Path::new("robots.txt"), &robots, outputs, failures);
            } else {
                tracing::info!(
                    "Skipping sitemap.xml: base_url `{}` is not an absolute URL",
                    base_url
                );
            }
        }

        if self.config.search_index {
            match serde_json::to_string_pretty(&search_index(summaries)) {
                Ok(json) => {
                    self.write_artifact(Path::new("search-index.json"), &json, outputs, failures)
                }
                Err(e) => tracing::warn!("Failed to serialize search index: {}", e),
            }
        }
    }

    fn write_artifact(
        &self,
        path: &Path,
        contents: &str,
        outputs: &mut Outputs,
        failures: &mut Vec<PageFailure>,
    ) {
        if let Some(owner) = outputs.get(path) {
            tracing::debug!(
                "{} is provided by {}, not generating it",
                path.display(),
                owner.display()
            );
            return;
        }

        match self.emitter.write(path, contents.as_bytes()) {
            Ok(_) => {
                outputs.insert(path.to_path_buf(), path.to_path_buf());
            }
            Err(e) => failures.push(PageFailure::emit(&e.path().to_path_buf(), e)),
        }
    }

    /// Delete output left over from earlier builds: drafts, removed posts,
    /// renamed slugs.
    fn remove_stale_output(&self, outputs: &Outputs, failures: &mut Vec<PageFailure>) {
        if !self.owns_output_dir() {
            tracing::warn!(
                "{} contains site sources, not removing stale output",
                self.config.output_dir.display()
            );
            return;
        }

        let (removed, errors) = self.emitter.prune(|path| outputs.contains_key(path));
        if removed > 0 {
            tracing::info!("Removed {} stale file(s)", removed);
        }
        failures.extend(
            errors
                .into_iter()
                .map(|e| PageFailure::emit(&e.path().to_path_buf(), e)),
        );
    }

    /// The output root holds none of the content, template or static
    /// directories.
    fn owns_output_dir(&self) -> bool {
        let Ok(output) = self.config.output_dir.canonicalize() else {
            return false;
        };

        std::iter::once(&self.config.content_dir)
            .chain(self.config.templates_dir.iter())
            .chain(self.config.static_dir.iter())
            .filter_map(|dir| dir.canonicalize().ok())
            .all(|dir| !dir.starts_with(&output))
    }

    fn sitemap(&self, summaries: &[PageSummary]) -> String {
        let urls: Vec<String> = summaries
            .iter()
            .map(|page| match page.published {
                Some(date) => format!(
                    "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n  </url>",
                    xml_escape(&page.url),
                    date.format("%Y-%m-%d")
                ),
                None => format!("  <url>\n    <loc>{}</loc>\n  </url>", xml_escape(&page.url)),
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{}
</urlset>
"#,
            urls.join("\n")
        )
    }
}

fn search_index(summaries: &[PageSummary]) -> Vec<serde_json::Value> {
    summaries
        .iter()
        .map(|page| {
            serde_json::json!({
                "title": page.title,
                "url": page.url,
                "description": page.description.clone().unwrap_or_default(),
                "date": page.date,
                "tags": page.tags,
                "content": page.summary,
            })
        })
        .collect()
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
