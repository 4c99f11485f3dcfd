//! Site configuration file (folio.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use folio_content::MarkdownConverter;
use folio_site::{BuildConfig, DEFAULT_TEMPLATE};

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub site: SiteSection,
    pub build: BuildSection,
    pub markdown: MarkdownSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub title: String,
    pub base_url: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            title: "Notes".to_string(),
            base_url: "/".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub content: PathBuf,
    pub output: PathBuf,
    pub templates: PathBuf,
    #[serde(rename = "static")]
    pub static_dir: PathBuf,
    pub default_template: String,
    pub pretty_urls: bool,
    pub drafts: bool,
    pub parallel: bool,
    pub date_format: String,
    pub sitemap: bool,
    pub search_index: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            content: PathBuf::from("content"),
            output: PathBuf::from("public"),
            templates: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
            default_template: DEFAULT_TEMPLATE.to_string(),
            pretty_urls: false,
            drafts: false,
            parallel: true,
            date_format: "%Y-%m-%d".to_string(),
            sitemap: true,
            search_index: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MarkdownSection {
    pub extensions: Vec<String>,
}

impl Default for MarkdownSection {
    fn default() -> Self {
        Self {
            extensions: MarkdownConverter::DEFAULT_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub content: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub drafts: bool,
    pub sequential: bool,
}

impl ConfigFile {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the config file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Resolve into a build configuration.
    ///
    /// Paths in the file are relative to the file's directory; override paths
    /// are used as given. A template directory from the file that does not
    /// exist falls back to the built-in theme, an explicit one must exist.
    pub fn into_build_config(self, config_path: &Path, overrides: Overrides) -> BuildConfig {
        let base = config_path.parent().unwrap_or(Path::new(""));
        let build = self.build;

        let templates_dir = match overrides.templates {
            Some(dir) => Some(dir),
            None => {
                let dir = resolve(base, build.templates);
                if dir.is_dir() {
                    Some(dir)
                } else {
                    tracing::debug!("No template directory at {}, using built-in theme", dir.display());
                    None
                }
            }
        };

        BuildConfig {
            content_dir: overrides
                .content
                .unwrap_or_else(|| resolve(base, build.content)),
            output_dir: overrides
                .output
                .unwrap_or_else(|| resolve(base, build.output)),
            templates_dir,
            static_dir: Some(resolve(base, build.static_dir)),
            site_title: self.site.title,
            base_url: self.site.base_url,
            default_template: build.default_template,
            pretty_urls: build.pretty_urls,
            include_drafts: overrides.drafts || build.drafts,
            parallel: build.parallel && !overrides.sequential,
            date_format: build.date_format,
            markdown_extensions: self.markdown.extensions,
            sitemap: build.sitemap,
            search_index: build.search_index,
        }
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_defaults() {
        let temp = tempdir().unwrap();

        let config = ConfigFile::load(&temp.path().join("folio.toml")).unwrap();

        assert_eq!(config.site.title, "Notes");
        assert_eq!(config.build.output, PathBuf::from("public"));
        assert!(config.build.parallel);
        assert_eq!(config.markdown.extensions.len(), 4);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("folio.toml");
        fs::write(
            &path,
            "[site]\ntitle = \"Field Notes\"\n\n[build]\npretty_urls = true\nstatic = \"assets\"\n",
        )
        .unwrap();

        let config = ConfigFile::load(&path).unwrap();

        assert_eq!(config.site.title, "Field Notes");
        assert_eq!(config.site.base_url, "/");
        assert!(config.build.pretty_urls);
        assert_eq!(config.build.static_dir, PathBuf::from("assets"));
        assert_eq!(config.build.content, PathBuf::from("content"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("folio.toml");
        fs::write(&path, "[build\ncontent = ").unwrap();

        let error = ConfigFile::load(&path).unwrap_err();

        assert!(error.to_string().contains("Failed to parse"));
    }

    #[test]
    fn paths_resolve_against_config_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("templates")).unwrap();
        let config_path = temp.path().join("folio.toml");

        let build = ConfigFile::default().into_build_config(&config_path, Overrides::default());

        assert_eq!(build.content_dir, temp.path().join("content"));
        assert_eq!(build.output_dir, temp.path().join("public"));
        assert_eq!(build.templates_dir, Some(temp.path().join("templates")));
        assert_eq!(build.static_dir, Some(temp.path().join("static")));
    }

    #[test]
    fn missing_template_directory_uses_builtin_theme() {
        let temp = tempdir().unwrap();

        let build = ConfigFile::default()
            .into_build_config(&temp.path().join("folio.toml"), Overrides::default());

        assert_eq!(build.templates_dir, None);
    }

    #[test]
    fn overrides_win() {
        let build = ConfigFile::default().into_build_config(
            Path::new("folio.toml"),
            Overrides {
                content: Some(PathBuf::from("posts")),
                output: Some(PathBuf::from("site")),
                templates: Some(PathBuf::from("theme")),
                drafts: true,
                sequential: true,
            },
        );

        assert_eq!(build.content_dir, PathBuf::from("posts"));
        assert_eq!(build.output_dir, PathBuf::from("site"));
        assert_eq!(build.templates_dir, Some(PathBuf::from("theme")));
        assert!(build.include_drafts);
        assert!(!build.parallel);
    }
}
