//! Free-flight movement for the viewer camera.

use bevy::prelude::*;

use crate::player::Player;
use crate::settings::Settings;

/// Speed multiplier while the boost key is held.
const BOOST_FACTOR: f32 = 4.0;

/// Which movement keys are held this frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlyInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub boost: bool,
}

impl FlyInput {
    /// Read the bound keys from `keys`.
    #[must_use]
    pub fn read(keys: &ButtonInput<KeyCode>, settings: &Settings) -> Self {
        let held = |action: &str| settings.controls.key_for(action).is_some_and(|k| keys.pressed(k));
        Self {
            forward: held("forward"),
            back: held("back"),
            left: held("left"),
            right: held("right"),
            up: held("up"),
            down: held("down"),
            boost: held("boost"),
        }
    }
}

/// Displacement for one frame. Horizontal movement follows the camera's
/// heading flattened onto the XZ plane; up/down move along world Y.
#[must_use]
pub fn fly_step(rotation: Quat, input: FlyInput, speed: f32, dt: f32) -> Vec3 {
    let forward_raw = rotation * Vec3::NEG_Z;
    let right_raw = rotation * Vec3::X;
    let fwd = Vec3::new(forward_raw.x, 0.0, forward_raw.z).normalize_or_zero();
    let right = Vec3::new(right_raw.x, 0.0, right_raw.z).normalize_or_zero();

    let mut dir = Vec3::ZERO;
    if input.forward { dir += fwd; }
    if input.back { dir -= fwd; }
    if input.right { dir += right; }
    if input.left { dir -= right; }
    if input.up { dir += Vec3::Y; }
    if input.down { dir -= Vec3::Y; }

    let speed = if input.boost { speed * BOOST_FACTOR } else { speed };
    dir.normalize_or_zero() * speed * dt
}

/// Move the player camera from keyboard input.
#[allow(clippy::needless_pass_by_value)]
pub fn fly_movement(
    keyboard_input: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    settings: Res<Settings>,
    mut query: Query<&mut Transform, With<Player>>,
) {
    let input = FlyInput::read(&keyboard_input, &settings);
    let dt = time.delta_seconds();
    for mut transform in &mut query {
        let step = fly_step(transform.rotation, input, settings.controls.fly_speed, dt);
        transform.translation += step;
    }
}
