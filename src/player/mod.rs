//! Fly camera used as the terrain viewer.
//!
//! # Example:
//!
//! ```ignore
//! commands.spawn((
//!     Camera3dBundle::default(),
//!     Player,
//!     PlayerLook::default(),
//!     TerrainViewer,
//! ));
//! app.add_plugins(PlayerPlugin);
//! ```
pub mod camera;
pub mod movement;

use bevy::prelude::*;

pub use camera::*;
pub use movement::*;

/// Marks the camera entity driven by the fly controls.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct Player;

/// Registers look, grab and movement systems.
pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, (cursor_grab, camera_look, fly_movement).chain());
    }
}
