//! Simple configuration persistence for twindeck
//!
//! Stores where the playlist lives, the audio block size, per-deck looping
//! and the gain new decks start with.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use twindeck_audio::DEFAULT_BLOCK_SIZE;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Playlist file; `None` means the default location
    pub playlist_path: Option<PathBuf>,
    /// Frames per audio block
    pub block_size: usize,
    /// Restart deck A when it reaches the end
    pub loop_a: bool,
    /// Restart deck B when it reaches the end
    pub loop_b: bool,
    /// Initial gain for both decks
    pub default_gain: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playlist_path: None,
            block_size: DEFAULT_BLOCK_SIZE,
            loop_a: false,
            loop_b: false,
            default_gain: 1.0,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Using default config ({}): {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Directory holding config and the default playlist
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("twindeck")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.txt")
    }

    /// Playlist file to use, falling back to the config directory
    pub fn playlist_file(&self) -> PathBuf {
        self.playlist_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("playlist.txt"))
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "playlist_path" => {
                        if !value.is_empty() {
                            config.playlist_path = Some(PathBuf::from(value));
                        }
                    }
                    "block_size" => match value.parse::<usize>() {
                        Ok(size) if size > 0 => config.block_size = size,
                        _ => tracing::warn!("Ignoring invalid block_size: {}", value),
                    },
                    "loop_a" => {
                        if let Some(on) = parse_bool(value) {
                            config.loop_a = on;
                        }
                    }
                    "loop_b" => {
                        if let Some(on) = parse_bool(value) {
                            config.loop_b = on;
                        }
                    }
                    "default_gain" => match value.parse::<f32>() {
                        Ok(gain) if gain.is_finite() && gain >= 0.0 => config.default_gain = gain,
                        _ => tracing::warn!("Ignoring invalid default_gain: {}", value),
                    },
                    _ => {} // Ignore unknown keys
                }
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push("# twindeck configuration".to_string());

        if let Some(ref path) = self.playlist_path {
            lines.push(format!("playlist_path={}", path.display()));
        }
        lines.push(format!("block_size={}", self.block_size));
        lines.push(format!("loop_a={}", self.loop_a));
        lines.push(format!("loop_b={}", self.loop_b));
        lines.push(format!("default_gain={}", self.default_gain));

        lines.join("\n")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}
