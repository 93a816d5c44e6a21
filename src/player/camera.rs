//! Camera control and cursor helpers.
//!
//! `camera_look` accumulates mouse motion for the current update and applies
//! yaw/pitch to the player's transform. `cursor_grab` toggles cursor
//! lock/visibility in response to input.

use bevy::input::mouse::MouseMotion;
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, PrimaryWindow};

use crate::player::Player;
use crate::settings::Settings;

const CAMERA_MAX_PITCH_DEG: f32 = 85.0;

/// Stores the player's look orientation (yaw and pitch) in radians.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct PlayerLook {
    /// Horizontal angle (radians).
    pub yaw: f32,
    /// Vertical angle (radians), clamped to +-85 degrees.
    pub pitch: f32,
}

impl PlayerLook {
    /// Apply a raw mouse delta (updates yaw/pitch and clamps pitch).
    pub fn apply_delta(&mut self, delta: Vec2, settings: &Settings) {
        let max_pitch = CAMERA_MAX_PITCH_DEG.to_radians();
        let scale = settings.controls.mouse_sensitivity / 10000.0;
        let dx = if settings.controls.invert_x { -delta.x } else { delta.x };
        let dy = if settings.controls.invert_y { -delta.y } else { delta.y };

        self.yaw -= dx * scale;
        self.pitch = (self.pitch - dy * scale).clamp(-max_pitch, max_pitch);
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }
}

/// Apply mouse-look to players with a `PlayerLook` component.
#[allow(clippy::needless_pass_by_value)]
pub fn camera_look(
    windows: Query<&Window, With<PrimaryWindow>>,
    motion_events: Res<Events<MouseMotion>>, // current-update events (Bevy 0.14)
    mut query: Query<(&mut Transform, &mut PlayerLook), With<Player>>,
    settings: Res<Settings>,
) {
    let delta: Vec2 = motion_events.iter_current_update_events().map(|ev| ev.delta).sum();
    if delta == Vec2::ZERO {
        return;
    }

    let Ok(window) = windows.get_single() else { return };
    if window.cursor.visible {
        return;
    }

    for (mut transform, mut look) in &mut query {
        look.apply_delta(delta, &settings);
        transform.rotation = look.rotation();
    }
}

/// Lock the cursor on left click, release it on the pause key.
#[allow(clippy::needless_pass_by_value)]
pub fn cursor_grab(
    mut wq: Query<&mut Window, With<PrimaryWindow>>,
    mb: Res<ButtonInput<MouseButton>>,
    kb: Res<ButtonInput<KeyCode>>,
    settings: Res<Settings>,
) {
    let Ok(mut w) = wq.get_single_mut() else { return };
    if mb.just_pressed(MouseButton::Left) {
        w.cursor.grab_mode = CursorGrabMode::Locked;
        w.cursor.visible = false;
    }

    let pause_kc = settings.controls.key_for("pause").unwrap_or(KeyCode::Escape);
    if kb.just_pressed(pause_kc) {
        w.cursor.grab_mode = CursorGrabMode::None;
        w.cursor.visible = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_clamped() {
        let mut look = PlayerLook::default();
        look.apply_delta(Vec2::new(0.0, -1.0e7), &Settings::default());
        assert!((look.pitch - CAMERA_MAX_PITCH_DEG.to_radians()).abs() < 1e-5);
    }

    #[test]
    fn invert_y_flips_pitch() {
        let mut settings = Settings::default();
        let mut normal = PlayerLook::default();
        normal.apply_delta(Vec2::new(0.0, 100.0), &settings);
        settings.controls.invert_y = true;
        let mut inverted = PlayerLook::default();
        inverted.apply_delta(Vec2::new(0.0, 100.0), &settings);
        assert!((normal.pitch + inverted.pitch).abs() < 1e-6);
        assert!(normal.pitch < 0.0);
    }

    #[test]
    fn invert_x_flips_yaw_only() {
        let mut settings = Settings::default();
        let mut normal = PlayerLook::default();
        normal.apply_delta(Vec2::new(100.0, 50.0), &settings);
        settings.controls.invert_x = true;
        let mut inverted = PlayerLook::default();
        inverted.apply_delta(Vec2::new(100.0, 50.0), &settings);
        assert!((normal.yaw + inverted.yaw).abs() < 1e-6);
        assert!(normal.yaw < 0.0);
        assert!((normal.pitch - inverted.pitch).abs() < 1e-6);
    }
}
