//! Watch command: rebuild on every change.

use std::path::Path;

use anyhow::{Context, Result};
use folio_watch::WatchLoop;

use crate::config::{ConfigFile, Overrides};

/// Run the watch loop until Ctrl-C.
pub async fn run(config_path: &Path, overrides: Overrides) -> Result<()> {
    let config = ConfigFile::load(config_path)?.into_build_config(config_path, overrides);

    tracing::info!(
        "Watching {} (output: {})",
        config.content_dir.display(),
        config.output_dir.display()
    );

    WatchLoop::new(config)
        .run()
        .await
        .context("Watch failed")?;

    Ok(())
}
