//! Static assets: verbatim copies plus the built-in stylesheet.

use std::path::{Path, PathBuf};

use folio_content::Asset;

use crate::emitter::{EmitError, Emitter};

/// Output path of the built-in stylesheet.
pub const STYLESHEET_PATH: &str = "style.css";

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// The stylesheet the built-in templates link to.
    pub fn default_css() -> &'static str {
        DEFAULT_CSS
    }

    /// Write the built-in stylesheet to the output root.
    pub fn write_default_css(emitter: &Emitter) -> Result<PathBuf, EmitError> {
        emitter.write(Path::new(STYLESHEET_PATH), DEFAULT_CSS.as_bytes())
    }

    /// Copy assets verbatim, mirroring their relative paths.
    ///
    /// Returns the number copied and the failures; one failed copy does not
    /// stop the rest.
    pub fn copy_all(
        emitter: &Emitter,
        assets: impl IntoIterator<Item = Asset>,
    ) -> (usize, Vec<EmitError>) {
        let mut copied = 0;
        let mut failures = Vec::new();

        for asset in assets {
            match emitter.copy(&asset.source_path, &asset.relative_path) {
                Ok(_) => copied += 1,
                Err(e) => {
                    tracing::warn!("Failed to copy asset {}: {}", asset.source_path.display(), e);
                    failures.push(e);
                }
            }
        }

        (copied, failures)
    }
}

const DEFAULT_CSS: &str = r#"/* folio default theme */

:root {
  --content-max-width: 48rem;
  --background: #fdfdfc;
  --foreground: #1f2328;
  --muted: #6b7280;
  --accent: #b7410e;
  --border: #e5e7eb;
}

* {
  box-sizing: border-box;
}

body {
  margin: 0;
  font-family: system-ui, -apple-system, sans-serif;
  background: var(--background);
  color: var(--foreground);
  line-height: 1.6;
}

.site-header,
.main {
  max-width: var(--content-max-width);
  margin: 0 auto;
  padding: 1.5rem;
}

.site-header {
  border-bottom: 1px solid var(--border);
}

.site-title {
  font-weight: 600;
  color: inherit;
  text-decoration: none;
}

a {
  color: var(--accent);
}

time {
  color: var(--muted);
  font-size: 0.875rem;
}

.tags {
  display: flex;
  gap: 0.5rem;
  padding: 0;
  list-style: none;
}

.tags li {
  font-size: 0.75rem;
  border: 1px solid var(--border);
  border-radius: 999px;
  padding: 0 0.5rem;
}

.toc {
  border-left: 2px solid var(--border);
  padding-left: 1rem;
  font-size: 0.875rem;
}

.toc ul {
  list-style: none;
  padding: 0;
}

.toc-level-3 {
  padding-left: 1rem;
}

.posts {
  list-style: none;
  padding: 0;
}

.posts li {
  margin-bottom: 1.25rem;
}

pre {
  overflow-x: auto;
  padding: 1rem;
  border-radius: 0.5rem;
  background: #f6f8fa;
}

code {
  font-family: ui-monospace, SFMono-Regular, Menlo, monospace;
  font-size: 0.9em;
}

table {
  border-collapse: collapse;
}

th,
td {
  border: 1px solid var(--border);
  padding: 0.25rem 0.75rem;
}
"#;
