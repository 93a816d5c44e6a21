pub mod chunk;
pub mod player;
pub mod ron;
pub mod settings;
pub mod terrain;
pub mod tile;
pub mod world;
