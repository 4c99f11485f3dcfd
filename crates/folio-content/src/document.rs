//! Loaded content documents.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::frontmatter::{extract_frontmatter, Frontmatter, FrontmatterError};

/// A content document: front matter plus raw Markdown body.
///
/// Identified by its source path. Fields are private so a document cannot
/// change after the loader hands it on.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    source_path: PathBuf,
    relative_path: PathBuf,
    frontmatter: Frontmatter,
    body: String,
}

impl Document {
    /// Parse a document from its source text.
    ///
    /// `relative_path` is the path below the content root and determines
    /// where the rendered page lands in the output tree.
    pub fn parse(
        source_path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        source: &str,
    ) -> Result<Self, FrontmatterError> {
        let (frontmatter, body) = extract_frontmatter(source)?;

        Ok(Self {
            source_path: source_path.into(),
            relative_path: relative_path.into(),
            frontmatter,
            body: body.to_string(),
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Path relative to the content root.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    pub fn title(&self) -> &str {
        &self.frontmatter.title
    }

    pub fn date(&self) -> Option<&DateTime<FixedOffset>> {
        self.frontmatter.date.as_ref()
    }

    pub fn is_draft(&self) -> bool {
        self.frontmatter.draft
    }

    /// Template requested by the document, if any.
    pub fn template(&self) -> Option<&str> {
        self.frontmatter.template.as_deref()
    }

    /// Raw markup body, without the front matter block.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Output file stem: the `slug` override, else the source file stem.
    pub fn stem(&self) -> &str {
        self.frontmatter
            .slug
            .as_deref()
            .filter(|slug| !slug.is_empty())
            .or_else(|| self.relative_path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or("index")
    }
}
