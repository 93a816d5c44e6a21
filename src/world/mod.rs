//! World metadata and its save/load boundary.
//!
//! A world is identified by a `WorldMeta` record written as RON to
//! `<save_path>/world_meta.ron` when the world is created. Terrain itself is
//! never saved; it is regenerated from the seed.
//!
//! # Example:
//!
//! ```
//! use tilefield::world::sanitize_world_name;
//! assert_eq!(sanitize_world_name("My World: v2/beta"), "My_World_v2beta");
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::{error, info};
use bevy::prelude::{Commands, Res, Resource};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Directory holding one folder per world.
pub const WORLDS_DIR: &str = "worlds";
pub const DEFAULT_WORLD_NAME: &str = "New World";
pub const META_FILE: &str = "world_meta.ron";
pub const WORLD_FORMAT_VERSION: u32 = 1;

/// Metadata for one world.
///
/// # Fields
/// * `id` - 31-bit id derived from the seed and creation time
/// * `name` - display name as entered
/// * `seed` - terrain noise seed
/// * `save_path` - folder the world's files live in
/// * `created_at` - creation time, unix seconds
/// * `version` - metadata format version
#[derive(Resource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMeta {
    pub id: u32,
    pub name: String,
    pub seed: u32,
    pub save_path: PathBuf,
    pub created_at: i64,
    #[serde(default = "WorldMeta::default_version")]
    pub version: u32,
}

impl WorldMeta {
    fn default_version() -> u32 { WORLD_FORMAT_VERSION }

    /// Build metadata for a new world under `worlds_dir`.
    #[must_use]
    pub fn new(name: &str, seed: u32, worlds_dir: impl AsRef<Path>, created: DateTime<Utc>) -> Self {
        let created_at = created.timestamp();
        Self {
            id: world_id(seed, created_at),
            name: name.to_string(),
            seed,
            save_path: worlds_dir.as_ref().join(sanitize_world_name(name)),
            created_at,
            version: WORLD_FORMAT_VERSION,
        }
    }

    /// Creation time, if the stored timestamp is representable.
    #[must_use]
    pub fn created(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.created_at, 0).single()
    }

    #[must_use]
    pub fn meta_path(&self) -> PathBuf {
        self.save_path.join(META_FILE)
    }
}

/// Errors from reading or writing world files.
#[derive(Debug)]
pub enum WorldIoError {
    Io(std::io::Error),
    Ron(ron::error::SpannedError),
    Serialize(ron::Error),
}

impl fmt::Display for WorldIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldIoError::Io(e) => write!(f, "world file io failed: {e}"),
            WorldIoError::Ron(e) => write!(f, "world metadata is not valid RON: {e}"),
            WorldIoError::Serialize(e) => write!(f, "world metadata could not be serialized: {e}"),
        }
    }
}

impl std::error::Error for WorldIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorldIoError::Io(e) => Some(e),
            WorldIoError::Ron(e) => Some(e),
            WorldIoError::Serialize(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for WorldIoError {
    fn from(e: std::io::Error) -> Self {
        WorldIoError::Io(e)
    }
}

impl From<ron::error::SpannedError> for WorldIoError {
    fn from(e: ron::error::SpannedError) -> Self {
        WorldIoError::Ron(e)
    }
}

impl From<ron::Error> for WorldIoError {
    fn from(e: ron::Error) -> Self {
        WorldIoError::Serialize(e)
    }
}

/// Folder-safe version of a world name: spaces become underscores, `:` and
/// `/` are dropped.
#[must_use]
pub fn sanitize_world_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ':' && *c != '/')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// `(seed ^ timestamp) & 0x7FFF_FFFF`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn world_id(seed: u32, timestamp: i64) -> u32 {
    (seed ^ timestamp as u32) & 0x7FFF_FFFF
}

/// Write `meta` to its `world_meta.ron`, creating the folder if needed.
///
/// # Errors
/// Returns `WorldIoError` if the folder or file cannot be written.
pub fn save_meta(meta: &WorldMeta) -> Result<(), WorldIoError> {
    fs::create_dir_all(&meta.save_path)?;
    let text = ron::ser::to_string_pretty(meta, ron::ser::PrettyConfig::default())?;
    fs::write(meta.meta_path(), text)?;
    Ok(())
}

/// Read the metadata stored in `save_path`.
///
/// # Errors
/// Returns `WorldIoError` if the file is missing or does not parse.
pub fn load_meta(save_path: impl AsRef<Path>) -> Result<WorldMeta, WorldIoError> {
    let text = fs::read_to_string(save_path.as_ref().join(META_FILE))?;
    Ok(ron::from_str(&text)?)
}

/// Create a world now: build its metadata, create its folder and save it.
///
/// # Errors
/// Returns `WorldIoError` if the metadata cannot be written.
pub fn create_world(name: &str, seed: u32, worlds_dir: impl AsRef<Path>) -> Result<WorldMeta, WorldIoError> {
    let meta = WorldMeta::new(name, seed, worlds_dir, Utc::now());
    save_meta(&meta)?;
    info!("created world '{}' (id {}, seed {}) at {}", meta.name, meta.id, meta.seed, meta.save_path.display());
    Ok(meta)
}

/// Startup system: create the default world from the configured seed and
/// insert its `WorldMeta` as a resource.
#[allow(clippy::needless_pass_by_value)]
pub fn create_world_on_startup(mut commands: Commands, settings: Res<Settings>) {
    match create_world(DEFAULT_WORLD_NAME, settings.generation.noise.seed, WORLDS_DIR) {
        Ok(meta) => commands.insert_resource(meta),
        Err(e) => error!("failed to create world '{DEFAULT_WORLD_NAME}': {e}"),
    }
}
