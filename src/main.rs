use bevy::diagnostic::{FrameTimeDiagnosticsPlugin, LogDiagnosticsPlugin};
use bevy::prelude::*;
use bevy::window::{PresentMode, Window, WindowPlugin};
use bevy_rapier3d::prelude::{NoUserData, RapierPhysicsPlugin};
use tilefield::chunk::TerrainStreamingPlugin;
use tilefield::player::PlayerPlugin;
use tilefield::settings::loader as settings_loader;
use tilefield::world::create_world_on_startup;

mod app;
use app::setup;

fn main() {
    let settings = settings_loader::load_settings_from_dir(settings_loader::SETTINGS_DIR);
    let settings_watcher = settings_loader::setup_settings_watcher(settings_loader::SETTINGS_DIR)
        .unwrap_or_else(|_| settings_loader::SettingsWatcher::stub());

    let mut app = App::new();

    app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "tilefield".into(),
                position: WindowPosition::Centered(MonitorSelection::Primary),
                present_mode: PresentMode::AutoNoVsync,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(FrameTimeDiagnosticsPlugin)
        .add_plugins(LogDiagnosticsPlugin::default())
        .add_plugins(RapierPhysicsPlugin::<NoUserData>::default());

    // Settings go in before the streaming plugin so it picks them up.
    app.insert_resource(settings);
    app.insert_resource(settings_watcher);
    app.insert_resource(ClearColor(Color::srgb(0.55, 0.70, 0.90)));

    app.add_plugins(TerrainStreamingPlugin)
        .add_plugins(PlayerPlugin);

    app.add_systems(Startup, (create_world_on_startup, setup));
    app.add_systems(Update, settings_loader::check_settings_changes);

    app.run();
}
