//! Scene setup for the demo binary.
use bevy::prelude::*;

use tilefield::chunk::TerrainViewer;
use tilefield::player::{Player, PlayerLook};
use tilefield::settings::Settings;
use tilefield::terrain::{HeightSampler, NoiseHeightSampler};

/// Height above the terrain the camera starts at.
const SPAWN_CLEARANCE: f32 = 30.0;

/// Spawn the sun, a skylight and the fly camera that the terrain streams around.
///
/// The camera starts above the sampled terrain height at the origin so it
/// does not spawn underground.
///
/// # Arguments
/// - `commands`: Commands used to spawn entities.
/// - `settings`: Generation settings used to sample the spawn height.
#[allow(clippy::needless_pass_by_value)]
pub fn setup(mut commands: Commands, settings: Res<Settings>) {
    let sampler = NoiseHeightSampler::new(&settings.generation);
    let spawn_y = sampler.height(0, 0) + SPAWN_CLEARANCE;

    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            shadows_enabled: false,
            illuminance: 9000.0,
            ..default()
        },
        transform: Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.9, 0.4, 0.0)),
        ..default()
    });

    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            shadows_enabled: false,
            illuminance: 1200.0,
            color: Color::srgb(0.72, 0.78, 0.90),
            ..default()
        },
        transform: Transform::from_rotation(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
        ..default()
    });

    let look = PlayerLook { yaw: 0.0, pitch: -0.35 };
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_xyz(0.0, spawn_y, 0.0).with_rotation(look.rotation()),
            ..default()
        },
        Player,
        look,
        TerrainViewer,
    ));
    info!("viewer spawned at height {spawn_y:.1}");
}
