//! Watch-and-rebuild loop.
//!
//! Builds once, then rebuilds whenever a watched file changes. A change that
//! arrives mid-build cancels that build between documents and starts over.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::{pin, Pin};
use std::time::Duration;

use tokio::sync::mpsc::Receiver;

use folio_site::{BuildConfig, BuildError, BuildResult, CancelFlag, StaticBuilder};

use crate::watcher::{FileWatcher, WatchError, WatchEvent};

/// Quiet period after a change before rebuilding.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

enum Outcome {
    Finished,
    Changed,
    Stop,
}

/// Rebuilds a site whenever its sources change.
pub struct WatchLoop {
    config: BuildConfig,
    debounce: Duration,
}

impl WatchLoop {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Directories whose changes trigger a rebuild.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.config.content_dir.clone()];
        paths.extend(self.config.templates_dir.clone());
        paths.extend(self.config.static_dir.clone());
        paths
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> Result<(), WatchError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// Run until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        let (_watcher, mut events) = FileWatcher::new(&self.watch_paths())?;
        let mut shutdown = pin!(shutdown);

        tracing::info!("Watching for changes, press Ctrl-C to stop");

        loop {
            let proceed = match self.build_once(&mut events, &mut shutdown).await? {
                Outcome::Stop => false,
                Outcome::Changed => self.settle(&mut events, &mut shutdown).await?,
                Outcome::Finished => self.next_change(&mut events, &mut shutdown).await?,
            };

            if !proceed {
                break;
            }
        }

        tracing::info!("Stopped watching");
        Ok(())
    }

    /// Run one build on the blocking pool, cancelling it on change or shutdown.
    async fn build_once<F>(
        &self,
        events: &mut Receiver<WatchEvent>,
        shutdown: &mut Pin<&mut F>,
    ) -> Result<Outcome, WatchError>
    where
        F: Future<Output = ()>,
    {
        let cancel = CancelFlag::new();
        let config = self.config.clone();
        let flag = cancel.clone();
        let mut build = tokio::task::spawn_blocking(move || {
            StaticBuilder::new(config)?.with_cancel_flag(flag).build()
        });

        loop {
            tokio::select! {
                result = &mut build => {
                    report(result?);
                    return Ok(Outcome::Finished);
                }
                event = events.recv() => {
                    let event = event.ok_or(WatchError::Closed)?;
                    if !self.is_relevant(&event) {
                        continue;
                    }
                    tracing::info!("{} changed, restarting build", event.path().display());
                    cancel.cancel();
                    report(build.await?);
                    return Ok(Outcome::Changed);
                }
                _ = shutdown.as_mut() => {
                    cancel.cancel();
                    report(build.await?);
                    return Ok(Outcome::Stop);
                }
            }
        }
    }

    /// Wait for a relevant change, then for things to settle.
    ///
    /// Returns false on shutdown.
    async fn next_change<F>(
        &self,
        events: &mut Receiver<WatchEvent>,
        shutdown: &mut Pin<&mut F>,
    ) -> Result<bool, WatchError>
    where
        F: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let event = event.ok_or(WatchError::Closed)?;
                    if self.is_relevant(&event) {
                        tracing::info!("{} changed, rebuilding", event.path().display());
                        break;
                    }
                }
                _ = shutdown.as_mut() => return Ok(false),
            }
        }

        self.settle(events, shutdown).await
    }

    /// Swallow follow-up events until none arrive for the debounce period.
    async fn settle<F>(
        &self,
        events: &mut Receiver<WatchEvent>,
        shutdown: &mut Pin<&mut F>,
    ) -> Result<bool, WatchError>
    where
        F: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                event = tokio::time::timeout(self.debounce, events.recv()) => match event {
                    Ok(Some(_)) => continue,
                    Ok(None) => return Err(WatchError::Closed),
                    Err(_) => return Ok(true),
                },
                _ = shutdown.as_mut() => return Ok(false),
            }
        }
    }

    /// Changes inside the output directory or to hidden and backup files do
    /// not trigger rebuilds.
    fn is_relevant(&self, event: &WatchEvent) -> bool {
        let path = event.path();
        let output = self
            .config
            .output_dir
            .canonicalize()
            .unwrap_or_else(|_| self.config.output_dir.clone());

        !path.starts_with(&output) && !is_scratch_file(path)
    }
}

fn is_scratch_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.') || name.ends_with('~'))
        .unwrap_or(false)
}

fn report(result: Result<BuildResult, BuildError>) {
    match result {
        Ok(result) if result.cancelled => {
            tracing::info!("Build cancelled after {} page(s)", result.pages);
        }
        Ok(result) if result.is_success() => {
            tracing::info!("Rebuilt {} page(s) in {}ms", result.pages, result.duration_ms);
        }
        Ok(result) => {
            tracing::warn!(
                "Rebuilt {} page(s) with {} failure(s)",
                result.pages,
                result.failures.len()
            );
        }
        Err(e) => tracing::error!("Build failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const POST: &str = "+++\ntitle = \"Post\"\n+++\nhello\n";

    async fn wait_for(path: &Path) {
        for _ in 0..200 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn site() -> (tempfile::TempDir, BuildConfig) {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("content")).unwrap();
        fs::write(temp.path().join("content/a.md"), POST).unwrap();

        let config = BuildConfig {
            content_dir: temp.path().join("content"),
            output_dir: temp.path().join("public"),
            ..Default::default()
        };
        (temp, config)
    }

    #[tokio::test]
    async fn builds_then_stops_on_shutdown() {
        let (temp, config) = site();
        let page = temp.path().join("public/a.html");

        let shutdown_page = page.clone();
        WatchLoop::new(config)
            .run_until(async move { wait_for(&shutdown_page).await })
            .await
            .unwrap();

        assert!(page.is_file());
    }

    #[tokio::test]
    async fn rebuilds_when_content_changes() {
        let (temp, config) = site();
        let root = temp.path().to_path_buf();

        WatchLoop::new(config)
            .run_until(async move {
                wait_for(&root.join("public/a.html")).await;
                // Give the watcher a moment after the first build
                tokio::time::sleep(Duration::from_millis(200)).await;
                fs::write(root.join("content/b.md"), POST).unwrap();
                wait_for(&root.join("public/b.html")).await;
            })
            .await
            .unwrap();

        assert!(temp.path().join("public/b.html").is_file());
    }

    #[tokio::test]
    async fn missing_content_dir_cannot_be_watched() {
        let temp = tempdir().unwrap();
        let config = BuildConfig {
            content_dir: temp.path().join("missing"),
            output_dir: temp.path().join("public"),
            ..Default::default()
        };

        let result = WatchLoop::new(config).run_until(async {}).await;

        assert!(matches!(result, Err(WatchError::NothingToWatch)));
    }

    #[test]
    fn output_and_scratch_files_are_ignored() {
        let (temp, config) = site();
        fs::create_dir_all(temp.path().join("public")).unwrap();
        let output = temp.path().join("public").canonicalize().unwrap();
        let watch = WatchLoop::new(config);

        assert!(!watch.is_relevant(&WatchEvent::Created(output.join("a.html"))));
        assert!(!watch.is_relevant(&WatchEvent::Modified(temp.path().join("content/.a.md.swp"))));
        assert!(!watch.is_relevant(&WatchEvent::Modified(temp.path().join("content/a.md~"))));
        assert!(watch.is_relevant(&WatchEvent::ContentModified(temp.path().join("content/a.md"))));
    }

    #[test]
    fn watches_configured_directories() {
        let config = BuildConfig {
            content_dir: PathBuf::from("content"),
            templates_dir: Some(PathBuf::from("templates")),
            static_dir: Some(PathBuf::from("static")),
            ..Default::default()
        };

        assert_eq!(
            WatchLoop::new(config).watch_paths(),
            vec![
                PathBuf::from("content"),
                PathBuf::from("templates"),
                PathBuf::from("static")
            ]
        );
    }
}
