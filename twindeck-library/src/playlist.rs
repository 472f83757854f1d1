//! Playlist - an ordered list of track identifiers persisted as plain text
//!
//! The file holds one identifier per line with no escaping. Duplicates are
//! filtered by exact string match, so the same file reached through two
//! different spellings is kept twice.

use crate::uri::display_title;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while persisting a playlist
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Ordered, de-duplicated list of track identifiers
///
/// Track lengths are measured at most once per entry and kept in memory only;
/// equality looks at the entries alone.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    entries: Vec<String>,
    /// Length in seconds by identifier; `None` when it couldn't be measured
    lengths: HashMap<String, Option<f64>>,
}

impl PartialEq for Playlist {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Playlist {}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a playlist file.
    ///
    /// A missing file yields an empty playlist. Blank lines are skipped and
    /// repeated entries dropped.
    pub fn load(path: &Path) -> Result<Self, PlaylistError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No playlist at {}", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut playlist = Self::new();
        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if !playlist.contains(line) {
                playlist.entries.push(line.to_string());
            }
        }

        tracing::info!("Loaded {} playlist entries from {}", playlist.len(), path.display());
        Ok(playlist)
    }

    /// Write one identifier per line, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), PlaylistError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut content = self.entries.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Append an entry. Returns false if the exact string is already present.
    pub fn add(&mut self, identifier: &str) -> bool {
        if self.contains(identifier) {
            tracing::info!("{} is already in the playlist", identifier);
            return false;
        }
        self.entries.push(identifier.to_string());
        true
    }

    /// Remove the entry at `index`
    pub fn remove(&mut self, index: usize) -> Option<String> {
        if index < self.entries.len() {
            let removed = self.entries.remove(index);
            self.lengths.remove(&removed);
            Some(removed)
        } else {
            None
        }
    }

    /// Record a known length, e.g. from a deck that just loaded the track
    pub fn set_length(&mut self, identifier: &str, seconds: f64) {
        if self.contains(identifier) {
            self.lengths.insert(identifier.to_string(), Some(seconds));
        }
    }

    /// Length of the entry at `index`, measuring it with `measure` only the
    /// first time it is asked for
    pub fn length_with<F>(&mut self, index: usize, measure: F) -> Option<f64>
    where
        F: FnOnce(&str) -> Option<f64>,
    {
        let identifier = self.entries.get(index)?;
        if let Some(&known) = self.lengths.get(identifier) {
            return known;
        }
        let length = measure(identifier.as_str());
        self.lengths.insert(identifier.clone(), length);
        length
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.iter().any(|e| e == identifier)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// Display title of the entry at `index`
    pub fn title(&self, index: usize) -> Option<String> {
        self.get(index).map(display_title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Indices of entries whose title contains `query` as a whole word,
    /// ignoring case. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<usize> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        (0..self.entries.len())
            .filter(|&i| {
                self.title(i)
                    .map(|title| contains_whole_word(&title.to_lowercase(), &query))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// True if `word` occurs in `text` bounded by non-alphanumerics or the ends
fn contains_whole_word(text: &str, word: &str) -> bool {
    let is_word_char = |c: char| c.is_alphanumeric();

    text.match_indices(word).any(|(start, matched)| {
        let end = start + matched.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}
