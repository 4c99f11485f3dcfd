//! Output emission.
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! a page is either fully written or not there at all. The temporary file is
//! removed on every error path when it is dropped.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::renderer::RenderedPage;

/// Errors that can occur while writing output.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EmitError {
    fn write(path: &Path, source: io::Error) -> Self {
        Self::WriteError {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::WriteError { path, .. } => path,
        }
    }
}

/// Writes files below an output root.
#[derive(Debug, Clone)]
pub struct Emitter {
    output_root: PathBuf,
}

impl Emitter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Create the output root.
    pub fn prepare(&self) -> Result<(), EmitError> {
        fs::create_dir_all(&self.output_root).map_err(|e| EmitError::write(&self.output_root, e))
    }

    /// Write a rendered page to `<output root>/<relative path>`.
    pub fn emit(&self, page: &RenderedPage) -> Result<PathBuf, EmitError> {
        self.write(&page.relative_path, page.html.as_bytes())
    }

    /// Write bytes to a path relative to the output root.
    pub fn write(&self, relative_path: &Path, contents: &[u8]) -> Result<PathBuf, EmitError> {
        let destination = self.destination(relative_path)?;

        replace_file(&destination, default_permissions(), |file| {
            file.write_all(contents)
        })
        .map_err(|e| EmitError::write(&destination, e))?;

        tracing::debug!("Wrote {}", destination.display());
        Ok(destination)
    }

    /// Copy a file verbatim to a path relative to the output root.
    pub fn copy(&self, source: &Path, relative_path: &Path) -> Result<PathBuf, EmitError> {
        let destination = self.destination(relative_path)?;

        let copy = || -> io::Result<()> {
            let mut input = File::open(source)?;
            let permissions = Some(input.metadata()?.permissions());
            replace_file(&destination, permissions, |file| {
                io::copy(&mut input, file).map(|_| ())
            })
        };
        copy().map_err(|e| EmitError::write(&destination, e))?;

        tracing::debug!("Copied {} to {}", source.display(), destination.display());
        Ok(destination)
    }

    /// Delete files below the root for which `keep` returns false, then any
    /// directories left empty.
    ///
    /// `keep` sees paths relative to the root. Hidden entries such as `.git`
    /// are never touched. Returns the number of files removed and the
    /// failures.
    pub fn prune(&self, keep: impl Fn(&Path) -> bool) -> (usize, Vec<EmitError>) {
        let mut removed = 0;
        let mut failures = Vec::new();

        let entries = WalkDir::new(&self.output_root)
            .min_depth(1)
            .contents_first(true);

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable output entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            let relative = path.strip_prefix(&self.output_root).unwrap_or(path);
            if is_hidden(relative) {
                continue;
            }

            if entry.file_type().is_dir() {
                // Fails unless the directory is empty
                if fs::remove_dir(path).is_ok() {
                    tracing::debug!("Removed empty directory {}", path.display());
                }
                continue;
            }

            if keep(relative) {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::debug!("Removed stale {}", path.display());
                    removed += 1;
                }
                Err(e) => failures.push(EmitError::write(path, e)),
            }
        }

        (removed, failures)
    }

    /// Join a relative path onto the root, refusing anything that escapes it.
    fn destination(&self, relative_path: &Path) -> Result<PathBuf, EmitError> {
        let escapes = relative_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes || relative_path.as_os_str().is_empty() {
            let path = self.output_root.join(relative_path);
            return Err(EmitError::write(
                &path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "output path must stay inside the output root",
                ),
            ));
        }

        Ok(self.output_root.join(relative_path))
    }
}

fn is_hidden(relative_path: &Path) -> bool {
    relative_path
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Fill a temporary file next to `destination`, flush it, then rename it over
/// `destination`.
fn replace_file(
    destination: &Path,
    permissions: Option<fs::Permissions>,
    fill: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    fill(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }

    temp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// Temporary files are created owner-only; published pages should not be.
#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}
