//! Track library for twindeck - decoding, playlist, and configuration

pub mod config;
mod loader;
mod playlist;
mod uri;

pub use config::Config;
pub use loader::TrackLoader;
pub use playlist::{Playlist, PlaylistError};
pub use uri::{display_title, identifier_path, percent_decode};
