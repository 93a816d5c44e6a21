//! Utilities for loading RON files and watching directories for changes.
//!
//! `load_ron_files` reads every `.ron` file in a directory; `setup_ron_watcher`
//! installs a filesystem watcher that raises a shared flag when something in
//! the directory is modified. Settings hot-reload is built on both.

use bevy::log::{error, warn};
use bevy::prelude::Resource;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// File-watcher resource for RON hot-reload.
#[derive(Resource)]
pub struct RonWatcher {
    pub changed: Arc<Mutex<bool>>, // Set to `true` when a watched file changes.
    _watcher: Option<notify::RecommendedWatcher>, // Kept alive for as long as the resource lives.
}

impl RonWatcher {
    /// A watcher with no OS backing; its flag only changes if set by hand.
    /// Used as the fallback when the real watcher cannot be created.
    #[must_use]
    pub fn stub() -> Self {
        RonWatcher {
            changed: Arc::new(Mutex::new(false)),
            _watcher: None,
        }
    }

    /// Whether an OS watcher backs this resource.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self._watcher.is_some()
    }

    /// Read and clear the changed flag. A poisoned lock is recovered, since
    /// the flag is a plain bool and cannot be left half-written.
    pub fn take_changed(&self) -> bool {
        let mut flag = self.changed.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *flag, false)
    }
}

/// Load all `.ron` files from a directory and deserialize them into `T`.
///
/// # Arguments
/// * `path` - Directory path to scan for `.ron` files.
///
/// # Return
/// All successfully parsed items, in directory order. Files that fail to
/// parse are skipped with a warning.
#[must_use]
pub fn load_ron_files<T: DeserializeOwned>(path: impl AsRef<Path>) -> Vec<T> {
    let mut items = Vec::new();
    let Ok(entries) = std::fs::read_dir(path.as_ref()) else {
        return items;
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "ron"))
        .collect();
    files.sort();

    for file in files {
        match std::fs::read_to_string(&file) {
            Ok(content) => match ron::from_str::<T>(&content) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Failed to parse {}: {e}", file.display()),
            },
            Err(e) => warn!("Failed to read {}: {e}", file.display()),
        }
    }

    items
}

/// Create a `RonWatcher` that watches a directory for modifications.
///
/// # Arguments
/// * `path` - Directory path to watch for `.ron` file changes.
///
/// # Return
/// A `RonWatcher` whose `changed` flag is raised on any modify event for a
/// path under the watched directory.
///
/// # Errors
/// Returns a `notify::Error` if the underlying file-watcher cannot be
/// created or registered for the provided path.
pub fn setup_ron_watcher(path: impl AsRef<Path>) -> Result<RonWatcher, notify::Error> {
    let path = path.as_ref();
    let changed = Arc::new(Mutex::new(false));
    let changed_clone = Arc::clone(&changed);
    let watched_path: PathBuf = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, notify::EventKind::Modify(_)) {
                    return;
                }
                let relevant = event.paths.iter().any(|p| {
                    std::fs::canonicalize(p)
                        .unwrap_or_else(|_| p.clone())
                        .starts_with(&watched_path)
                });
                if relevant {
                    *changed_clone.lock().unwrap_or_else(PoisonError::into_inner) = true;
                }
            }
            Err(e) => error!("Watch error: {e}"),
        },
        Config::default(),
    )?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(RonWatcher { changed, _watcher: Some(watcher) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entry {
        name: String,
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tilefield-ron-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn loads_only_parseable_ron_files_in_name_order() {
        let dir = scratch_dir("load");
        std::fs::write(dir.join("b.ron"), "(name: \"second\")").expect("write");
        std::fs::write(dir.join("a.ron"), "(name: \"first\")").expect("write");
        std::fs::write(dir.join("broken.ron"), "(name: ").expect("write");
        std::fs::write(dir.join("notes.txt"), "(name: \"ignored\")").expect("write");

        let items: Vec<Entry> = load_ron_files(&dir);
        let names: Vec<_> = items.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let items: Vec<Entry> = load_ron_files("definitely/not/here");
        assert!(items.is_empty());
    }

    #[test]
    fn take_changed_clears_flag() {
        let watcher = RonWatcher::stub();
        assert!(!watcher.is_live());
        assert!(!watcher.take_changed());
        *watcher.changed.lock().expect("lock") = true;
        assert!(watcher.take_changed());
        assert!(!watcher.take_changed());
    }
}
