//! Content loading for folio.
//!
//! This crate discovers documents under a content root, parses their
//! front matter (`+++` TOML or `---` YAML), and converts Markdown bodies to
//! HTML behind the [`MarkupConverter`] interface.

pub mod document;
pub mod frontmatter;
pub mod loader;
pub mod markup;

pub use document::Document;
pub use frontmatter::{extract_frontmatter, Format, Frontmatter, FrontmatterError};
pub use loader::{walk_files, Asset, ContentLoader, LoadError};
pub use markup::{MarkdownConverter, MarkupConverter, MarkupError, TocEntry};
