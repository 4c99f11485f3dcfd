//! Content discovery.
//!
//! Walks a content root and yields documents and static assets lazily. Each
//! call to [`ContentLoader::documents`] starts a fresh walk, so a sequence
//! can be restarted by calling it again.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::document::Document;
use crate::frontmatter::FrontmatterError;

/// File extensions treated as documents. Everything else is an asset.
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Errors produced while loading content.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("content root {} is unreadable: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed front matter in {}: {source}", path.display())]
    MalformedFrontMatter {
        path: PathBuf,
        #[source]
        source: FrontmatterError,
    },
}

impl LoadError {
    /// The file or directory the error concerns, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::RootUnreadable { path, .. }
            | Self::Read { path, .. }
            | Self::MalformedFrontMatter { path, .. } => Some(path),
            Self::Walk(e) => e.path(),
        }
    }
}

/// A non-document file that is copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Absolute (or root-joined) source path
    pub source_path: PathBuf,

    /// Path relative to the root it was found under
    pub relative_path: PathBuf,
}

/// Lazy reader over a content directory tree.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    root: PathBuf,
}

impl ContentLoader {
    /// Open a content root, failing if it cannot be listed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let root = root.into();
        fs::read_dir(&root).map_err(|source| LoadError::RootUnreadable {
            path: root.clone(),
            source,
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Iterate over all documents below the root, in file-name order.
    ///
    /// A document that cannot be read or parsed yields an `Err` item and the
    /// walk continues with the next file.
    pub fn documents(&self) -> impl Iterator<Item = Result<Document, LoadError>> + '_ {
        self.files().filter_map(|entry| match entry {
            Ok(file) if is_document(&file.source_path) => Some(load_document(file)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }

    /// Iterate over all non-document files below the root.
    ///
    /// Walk errors are left to [`ContentLoader::documents`] to report.
    pub fn assets(&self) -> impl Iterator<Item = Asset> + '_ {
        self.files().filter_map(|entry| match entry {
            Ok(file) if !is_document(&file.source_path) => Some(file),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry while listing assets: {}", e);
                None
            }
        })
    }

    fn files(&self) -> impl Iterator<Item = Result<Asset, LoadError>> + '_ {
        walk_files(&self.root)
    }
}

/// Walk every regular, non-hidden file below `root`.
///
/// Also used for the static directory, which holds assets only.
pub fn walk_files(root: &Path) -> impl Iterator<Item = Result<Asset, LoadError>> + '_ {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let source_path = entry.path().to_path_buf();
                let relative_path = source_path
                    .strip_prefix(root)
                    .unwrap_or(&source_path)
                    .to_path_buf();
                Some(Ok(Asset {
                    source_path,
                    relative_path,
                }))
            }
            Ok(_) => None,
            Err(e) => Some(Err(LoadError::Walk(e))),
        })
}

fn load_document(file: Asset) -> Result<Document, LoadError> {
    let source = fs::read_to_string(&file.source_path).map_err(|source| LoadError::Read {
        path: file.source_path.clone(),
        source,
    })?;

    Document::parse(&file.source_path, file.relative_path, &source).map_err(|source| {
        LoadError::MalformedFrontMatter {
            path: file.source_path,
            source,
        }
    })
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            DOCUMENT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const VALID: &str = "+++\ntitle = \"Valid\"\n+++\nbody\n";

    #[test]
    fn loads_documents_recursively() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("posts")).unwrap();
        fs::write(temp.path().join("about.md"), VALID).unwrap();
        fs::write(temp.path().join("posts/first.markdown"), VALID).unwrap();

        let loader = ContentLoader::open(temp.path()).unwrap();
        let docs: Vec<Document> = loader.documents().map(Result::unwrap).collect();

        let paths: Vec<&Path> = docs.iter().map(|d| d.relative_path()).collect();
        assert_eq!(
            paths,
            vec![Path::new("about.md"), Path::new("posts/first.markdown")]
        );
    }

    #[test]
    fn reports_malformed_document_and_continues() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a-broken.md"), "+++\ntitle = \"x\"\n").unwrap();
        fs::write(temp.path().join("b-good.md"), VALID).unwrap();

        let loader = ContentLoader::open(temp.path()).unwrap();
        let results: Vec<_> = loader.documents().collect();

        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(LoadError::MalformedFrontMatter {
                source: FrontmatterError::Unclosed(_),
                ..
            })
        ));
        assert_eq!(results[1].as_ref().unwrap().title(), "Valid");
    }

    #[test]
    fn separates_assets_and_skips_hidden_files() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("images")).unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join("post.md"), VALID).unwrap();
        fs::write(temp.path().join("images/ferris.png"), [0x89, 0x50]).unwrap();
        fs::write(temp.path().join(".DS_Store"), "").unwrap();
        fs::write(temp.path().join(".git/HEAD"), "ref").unwrap();

        let loader = ContentLoader::open(temp.path()).unwrap();
        let assets: Vec<PathBuf> = loader.assets().map(|a| a.relative_path).collect();

        assert_eq!(assets, vec![PathBuf::from("images/ferris.png")]);
        assert_eq!(loader.documents().count(), 1);
    }

    #[test]
    fn sequence_restarts_on_each_call() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("one.md"), VALID).unwrap();

        let loader = ContentLoader::open(temp.path()).unwrap();

        assert_eq!(loader.documents().count(), 1);
        fs::write(temp.path().join("two.md"), VALID).unwrap();
        assert_eq!(loader.documents().count(), 2);
    }

    #[test]
    fn open_fails_for_missing_root() {
        let temp = tempdir().unwrap();

        let result = ContentLoader::open(temp.path().join("missing"));

        assert!(matches!(result, Err(LoadError::RootUnreadable { .. })));
    }

    #[test]
    fn open_fails_when_root_is_a_file() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("content");
        fs::write(&file, "").unwrap();

        assert!(ContentLoader::open(&file).is_err());
    }
}
