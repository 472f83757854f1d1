//! Audio engine for twindeck - decks, mixer, and the real-time renderer
//!
//! This module provides the playback pipeline:
//! - Source: Readers producing interleaved stereo from a decoded track
//! - Transport: Play/stop/seek state over one source
//! - Resampler: Native-rate to output-rate conversion with a speed multiplier
//! - Deck: Transport, resampler and gain behind lock-free parameters
//! - Mixer: Sums decks into the output block
//! - Engine: Control handle and audio-callback renderer for two decks

mod deck;
mod engine;
mod error;
mod mixer;
mod resampler;
mod source;
mod transport;

pub use deck::{DeckAtomics, DeckPlayer, DeckState, PreparedSource, DEFAULT_BLOCK_SIZE};
pub use engine::{AudioCommand, AudioEngine, DeckId, EngineState, Renderer, DECK_COUNT};
pub use error::{AudioError, OpenError};
pub use mixer::{AudioSource, Mixer};
pub use resampler::{validate_speed, Resampler, MAX_SPEED, MIN_SPEED};
pub use source::{MemorySource, SourceOpener, SourceReader};
pub use transport::{Transport, TransportState};
