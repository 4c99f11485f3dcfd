//! Static site build command.

use std::path::Path;

use anyhow::{bail, Context, Result};
use folio_site::{BuildError, BuildResult, StaticBuilder};

use crate::config::{ConfigFile, Overrides};

/// Run the build command.
pub async fn run(config_path: &Path, overrides: Overrides) -> Result<()> {
    let config = ConfigFile::load(config_path)?.into_build_config(config_path, overrides);

    tracing::info!(
        "Building {} into {}",
        config.content_dir.display(),
        config.output_dir.display()
    );

    let result = tokio::task::spawn_blocking(move || -> Result<BuildResult, BuildError> {
        StaticBuilder::new(config)?.build()
    })
    .await
    .context("Build task panicked")?
    .context("Build failed")?;

    tracing::info!("Output: {}", result.output_dir.display());

    check(&result)
}

/// Fail when any file failed.
fn check(result: &BuildResult) -> Result<()> {
    if !result.is_success() {
        bail!(
            "{} file(s) failed to build, {} page(s) written",
            result.failures.len(),
            result.pages
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn builds_site_from_config() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("content")).unwrap();
        fs::write(
            temp.path().join("content/hello.md"),
            "+++\ntitle = \"Hello\"\n+++\nhello\n",
        )
        .unwrap();
        fs::write(temp.path().join("folio.toml"), "[site]\ntitle = \"Test\"\n").unwrap();

        run(&temp.path().join("folio.toml"), Overrides::default())
            .await
            .unwrap();

        let html = fs::read_to_string(temp.path().join("public/hello.html")).unwrap();
        assert!(html.contains("<p>hello</p>"));
    }

    #[tokio::test]
    async fn page_failures_fail_the_command() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("content")).unwrap();
        fs::write(temp.path().join("content/bad.md"), "no front matter\n").unwrap();
        fs::write(
            temp.path().join("content/good.md"),
            "+++\ntitle = \"Good\"\n+++\n",
        )
        .unwrap();

        let error = run(&temp.path().join("folio.toml"), Overrides::default())
            .await
            .unwrap_err();

        assert!(error.to_string().contains("1 file(s) failed"));
        assert!(temp.path().join("public/good.html").is_file());
    }

    #[tokio::test]
    async fn output_root_that_is_a_file_fails() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("content")).unwrap();
        fs::write(temp.path().join("public"), "").unwrap();

        let result = run(&temp.path().join("folio.toml"), Overrides::default()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreadable_content_root_fails() {
        let temp = tempdir().unwrap();

        let result = run(&temp.path().join("folio.toml"), Overrides::default()).await;

        assert!(result.is_err());
    }
}
