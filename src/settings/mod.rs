//! Settings, types and defaults.
//!
//! Settings are stored as a RON file under `data/settings/` and are hot-reloadable
//! using the RON watcher utilities (see `ron::setup_ron_watcher`). Every field
//! has its own serde default so a partial file only overrides what it names.
pub mod loader;

use bevy::prelude::{KeyCode, Resource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Streaming radii around the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSettings {
    #[serde(default = "StreamingSettings::default_render_distance")]
    pub render_distance: u32, // Square radius (in chunks) kept loaded around the viewer.
    #[serde(default = "StreamingSettings::default_collision_distance")]
    pub collision_distance: u32, // Square radius (in chunks) that gets physics colliders.
    #[serde(default = "StreamingSettings::default_viewer_epsilon")]
    pub viewer_epsilon: f32, // Viewer movement (world units) below which visibility is not re-evaluated.
}

impl StreamingSettings {
    fn default_render_distance() -> u32 { 5 }
    fn default_collision_distance() -> u32 { 1 }
    fn default_viewer_epsilon() -> f32 { 1.0 }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            render_distance: Self::default_render_distance(),
            collision_distance: Self::default_collision_distance(),
            viewer_epsilon: Self::default_viewer_epsilon(),
        }
    }
}

/// Base gradient noise used by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    Perlin,
    #[default]
    Simplex,
}

/// How octaves of the detail layer are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FractalKind {
    #[default]
    Fbm,
    Ridged,
    Billow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSettings {
    #[serde(default = "NoiseSettings::default_seed")]
    pub seed: u32, // Seed for the continent layer; the detail layer uses seed + 1000.
    #[serde(default)]
    pub kind: NoiseKind,
    #[serde(default = "NoiseSettings::default_base_frequency")]
    pub base_frequency: f64, // Continent layer frequency (per world unit).
    #[serde(default = "NoiseSettings::default_detail_frequency")]
    pub detail_frequency: f64, // Detail layer frequency (per world unit).
    #[serde(default = "NoiseSettings::default_detail_strength")]
    pub detail_strength: f64, // Weight of the detail layer against the continent layer.
    #[serde(default)]
    pub fractal: FractalKind,
    #[serde(default = "NoiseSettings::default_octaves")]
    pub octaves: usize,
    #[serde(default = "NoiseSettings::default_persistence")]
    pub persistence: f64,
    #[serde(default = "NoiseSettings::default_lacunarity")]
    pub lacunarity: f64,
    #[serde(default)]
    pub height_curve: Vec<[f32; 2]>, // (input, output) pairs in 0..=1, sorted by input. Empty = identity.
}

impl NoiseSettings {
    fn default_seed() -> u32 { 1337 }
    fn default_base_frequency() -> f64 { 0.001 }
    fn default_detail_frequency() -> f64 { 0.02 }
    fn default_detail_strength() -> f64 { 0.3 }
    fn default_octaves() -> usize { 4 }
    fn default_persistence() -> f64 { 0.5 }
    fn default_lacunarity() -> f64 { 2.0 }
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            seed: Self::default_seed(),
            kind: NoiseKind::default(),
            base_frequency: Self::default_base_frequency(),
            detail_frequency: Self::default_detail_frequency(),
            detail_strength: Self::default_detail_strength(),
            fractal: FractalKind::default(),
            octaves: Self::default_octaves(),
            persistence: Self::default_persistence(),
            lacunarity: Self::default_lacunarity(),
            height_curve: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "GenerationSettings::default_height_scale")]
    pub height_scale: f32, // Fraction of MAX_HEIGHT the terrain may span.
    #[serde(default)]
    pub noise: NoiseSettings,
}

impl GenerationSettings {
    fn default_height_scale() -> f32 { 0.3 }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            height_scale: Self::default_height_scale(),
            noise: NoiseSettings::default(),
        }
    }
}

/// Per-tick work limits and the adaptive mesh budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSettings {
    #[serde(default = "PerformanceSettings::default_max_create")]
    pub max_create_per_frame: usize, // New chunk records per tick.
    #[serde(default = "PerformanceSettings::default_max_data_gen")]
    pub max_data_gen_per_frame: usize, // Chunks whose terrain is generated per tick.
    #[serde(default = "PerformanceSettings::default_max_mesh_build")]
    pub max_mesh_build_per_frame: usize, // Upper bound for mesh builds per tick.
    #[serde(default = "PerformanceSettings::default_max_collision_build")]
    pub max_collision_build_per_frame: usize, // Colliders built per tick.
    #[serde(default = "PerformanceSettings::default_max_removal")]
    pub max_removal_per_frame: usize, // Chunks released per tick.
    #[serde(default = "PerformanceSettings::default_auto_adjust_budgets")]
    pub auto_adjust_budgets: bool, // Shrink/grow the mesh budget from frame time.
    #[serde(default = "PerformanceSettings::default_budget_interval_secs")]
    pub budget_interval_secs: f32,
    #[serde(default = "PerformanceSettings::default_frame_ms_high")]
    pub frame_ms_high: f32, // Above this smoothed frame time the budget shrinks.
    #[serde(default = "PerformanceSettings::default_frame_ms_low")]
    pub frame_ms_low: f32, // Below this smoothed frame time the budget grows.
    #[serde(default = "PerformanceSettings::default_frame_smoothing")]
    pub frame_smoothing: f32,
}

impl PerformanceSettings {
    fn default_max_create() -> usize { 4 }
    fn default_max_data_gen() -> usize { 4 }
    fn default_max_mesh_build() -> usize { 2 }
    fn default_max_collision_build() -> usize { 2 }
    fn default_max_removal() -> usize { 8 }
    fn default_auto_adjust_budgets() -> bool { true }
    fn default_budget_interval_secs() -> f32 { 0.25 }
    fn default_frame_ms_high() -> f32 { 22.0 }
    fn default_frame_ms_low() -> f32 { 14.0 }
    fn default_frame_smoothing() -> f32 { 0.1 }
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_create_per_frame: Self::default_max_create(),
            max_data_gen_per_frame: Self::default_max_data_gen(),
            max_mesh_build_per_frame: Self::default_max_mesh_build(),
            max_collision_build_per_frame: Self::default_max_collision_build(),
            max_removal_per_frame: Self::default_max_removal(),
            auto_adjust_budgets: Self::default_auto_adjust_budgets(),
            budget_interval_secs: Self::default_budget_interval_secs(),
            frame_ms_high: Self::default_frame_ms_high(),
            frame_ms_low: Self::default_frame_ms_low(),
            frame_smoothing: Self::default_frame_smoothing(),
        }
    }
}

/// Controls / input settings for the fly camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlsSettings {
    #[serde(default)]
    pub invert_y: bool,
    #[serde(default)]
    pub invert_x: bool,
    #[serde(default = "ControlsSettings::default_sensitivity")]
    pub mouse_sensitivity: f32,
    #[serde(default = "ControlsSettings::default_fly_speed")]
    pub fly_speed: f32, // World units per second.
    #[serde(default = "ControlsSettings::default_keybinds")]
    pub keybinds: HashMap<String, String>, // Action name -> key identifier.
}

impl ControlsSettings {
    fn default_sensitivity() -> f32 { 1.0 }
    fn default_fly_speed() -> f32 { 40.0 }

    fn default_keybinds() -> HashMap<String, String> {
        [
            ("forward", "W"),
            ("back", "S"),
            ("left", "A"),
            ("right", "D"),
            ("up", "Space"),
            ("down", "LShift"),
            ("boost", "LCtrl"),
        ]
        .into_iter()
        .map(|(action, key)| (action.to_string(), key.to_string()))
        .collect()
    }

    /// Key bound to `action`, falling back to the default binding when the
    /// user's map is missing the action or names an unknown key.
    #[must_use]
    pub fn key_for(&self, action: &str) -> Option<KeyCode> {
        self.keybinds
            .get(action)
            .and_then(|name| Settings::keycode_from_str(name))
            .or_else(|| {
                Self::default_keybinds()
                    .get(action)
                    .and_then(|name| Settings::keycode_from_str(name))
            })
    }
}

impl Default for ControlsSettings {
    fn default() -> Self {
        Self {
            invert_y: false,
            invert_x: false,
            mouse_sensitivity: Self::default_sensitivity(),
            fly_speed: Self::default_fly_speed(),
            keybinds: Self::default_keybinds(),
        }
    }
}

/// Top-level Settings
#[derive(Resource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub streaming: StreamingSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
    #[serde(default)]
    pub controls: ControlsSettings,
}

impl Settings {
    #[must_use]
    pub fn defaults() -> Self { Settings::default() }

    /// Convert a key identifier from `controls.keybinds` (e.g. "W", "Space",
    /// "LShift") into a Bevy `KeyCode`.
    ///
    /// # Return
    /// `None` when the identifier is not recognised.
    #[must_use]
    pub fn keycode_from_str(name: &str) -> Option<KeyCode> {
        const LETTERS: [KeyCode; 26] = [
            KeyCode::KeyA, KeyCode::KeyB, KeyCode::KeyC, KeyCode::KeyD, KeyCode::KeyE,
            KeyCode::KeyF, KeyCode::KeyG, KeyCode::KeyH, KeyCode::KeyI, KeyCode::KeyJ,
            KeyCode::KeyK, KeyCode::KeyL, KeyCode::KeyM, KeyCode::KeyN, KeyCode::KeyO,
            KeyCode::KeyP, KeyCode::KeyQ, KeyCode::KeyR, KeyCode::KeyS, KeyCode::KeyT,
            KeyCode::KeyU, KeyCode::KeyV, KeyCode::KeyW, KeyCode::KeyX, KeyCode::KeyY,
            KeyCode::KeyZ,
        ];

        let upper = name.trim().to_ascii_uppercase();
        let bytes = upper.as_bytes();
        if let [c @ b'A'..=b'Z'] = bytes {
            return Some(LETTERS[usize::from(*c - b'A')]);
        }

        Some(match upper.as_str() {
            "SPACE" => KeyCode::Space,
            "LSHIFT" | "SHIFT" => KeyCode::ShiftLeft,
            "RSHIFT" => KeyCode::ShiftRight,
            "LCTRL" | "CTRL" | "CONTROL" => KeyCode::ControlLeft,
            "RCTRL" => KeyCode::ControlRight,
            "LALT" | "ALT" => KeyCode::AltLeft,
            "TAB" => KeyCode::Tab,
            "ESC" | "ESCAPE" => KeyCode::Escape,
            "UP" | "ARROWUP" => KeyCode::ArrowUp,
            "DOWN" | "ARROWDOWN" => KeyCode::ArrowDown,
            "LEFT" | "ARROWLEFT" => KeyCode::ArrowLeft,
            "RIGHT" | "ARROWRIGHT" => KeyCode::ArrowRight,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let text = "(streaming: (render_distance: 8), performance: (max_removal_per_frame: 3))";
        let settings: Settings = ron::from_str(text).expect("valid settings");
        assert_eq!(settings.streaming.render_distance, 8);
        assert_eq!(settings.streaming.collision_distance, 1);
        assert_eq!(settings.performance.max_removal_per_frame, 3);
        assert_eq!(settings.performance.max_mesh_build_per_frame, 2);
        assert_eq!(settings.generation, GenerationSettings::default());
    }

    #[test]
    fn noise_kinds_parse_lowercase() {
        let text = "(kind: perlin, fractal: ridged, height_curve: [(0.0, 0.0), (1.0, 1.0)])";
        let noise: NoiseSettings = ron::from_str(text).expect("valid noise settings");
        assert_eq!(noise.kind, NoiseKind::Perlin);
        assert_eq!(noise.fractal, FractalKind::Ridged);
        assert_eq!(noise.height_curve.len(), 2);
        assert_eq!(noise.seed, 1337);
    }

    #[test]
    fn keycodes_parse_letters_and_names() {
        assert_eq!(Settings::keycode_from_str("w"), Some(KeyCode::KeyW));
        assert_eq!(Settings::keycode_from_str("Space"), Some(KeyCode::Space));
        assert_eq!(Settings::keycode_from_str("LShift"), Some(KeyCode::ShiftLeft));
        assert_eq!(Settings::keycode_from_str("Hyper"), None);
    }

    #[test]
    fn unknown_binding_falls_back_to_default() {
        let mut controls = ControlsSettings::default();
        controls.keybinds.insert("forward".into(), "NotAKey".into());
        controls.keybinds.remove("back");
        assert_eq!(controls.key_for("forward"), Some(KeyCode::KeyW));
        assert_eq!(controls.key_for("back"), Some(KeyCode::KeyS));
        assert_eq!(controls.key_for("dance"), None);
    }
}
