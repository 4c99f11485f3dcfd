//! Watch-and-rebuild loop for folio sites.
//!
//! Watches the content, template and static directories with `notify` and
//! reruns the site build on the blocking pool whenever something changes.

pub mod rebuild;
pub mod watcher;

pub use rebuild::{WatchLoop, DEFAULT_DEBOUNCE};
pub use watcher::{FileWatcher, WatchError, WatchEvent};
