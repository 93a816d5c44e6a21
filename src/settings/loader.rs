//! Settings loading and hot-reloading.
//!
//! Settings are loaded from RON files in `data/settings`. If several files are
//! present the first one (by file name) that parses wins; with none, defaults
//! are used. A watcher resource flags edits so `check_settings_changes` can
//! swap in the new values while the app runs.
use crate::ron::{load_ron_files, setup_ron_watcher, RonWatcher};
use crate::settings::Settings;
use bevy::log::{info, warn};
use bevy::prelude::{Res, ResMut, Resource};

/// Directory scanned for settings files.
pub const SETTINGS_DIR: &str = "data/settings";

#[derive(Resource)]
pub struct SettingsWatcher(pub RonWatcher);

impl SettingsWatcher {
    #[must_use]
    pub fn stub() -> Self {
        SettingsWatcher(RonWatcher::stub())
    }
}

/// Load settings from `path` (directory).
///
/// # Arguments
/// * `path` - Directory holding settings RON files (e.g. `data/settings`).
///
/// # Return
/// The first successfully parsed `Settings`, or `Settings::default()` when
/// the directory has none.
#[must_use]
pub fn load_settings_from_dir(path: &str) -> Settings {
    let items: Vec<Settings> = load_ron_files(path);
    if let Some(first) = items.into_iter().next() {
        first
    } else {
        warn!("No settings found in {path}, using defaults");
        Settings::defaults()
    }
}

/// Create a watcher for the settings directory (hot-reload).
///
/// # Errors
/// Propagates the `notify::Error` when the directory cannot be watched.
pub fn setup_settings_watcher(path: &str) -> Result<SettingsWatcher, notify::Error> {
    setup_ron_watcher(path).map(SettingsWatcher)
}

/// Reload the `Settings` resource when the watcher saw a change.
///
/// Only assigns the resource when the parsed value differs, so systems that
/// react to `Settings` change detection do not fire on no-op saves.
#[allow(clippy::needless_pass_by_value)]
pub fn check_settings_changes(watcher: Res<SettingsWatcher>, mut settings: ResMut<Settings>) {
    if !watcher.0.take_changed() {
        return;
    }
    let reloaded = load_settings_from_dir(SETTINGS_DIR);
    if *settings != reloaded {
        info!("Settings changed, reloading");
        *settings = reloaded;
    }
}
