//! Audio engine - two decks summed through the mixer
//!
//! `EngineState` is what the audio callback renders. It is shared as
//! `Arc<Mutex<EngineState>>`: the callback only ever `try_lock`s it (and plays
//! silence for that block on contention), while the control side locks it for
//! short, allocation-free updates. Gain and speed bypass the lock entirely
//! through each deck's `DeckAtomics`.

use crate::deck::{DeckAtomics, DeckPlayer, DeckState, PreparedSource, DEFAULT_BLOCK_SIZE};
use crate::error::{AudioError, OpenError};
use crate::mixer::{AudioSource, Mixer};
use crate::source::SourceOpener;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Number of decks the engine mixes
pub const DECK_COUNT: usize = 2;

/// Deck identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub const ALL: [DeckId; DECK_COUNT] = [DeckId::A, DeckId::B];

    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    pub fn label(self) -> char {
        match self {
            DeckId::A => 'A',
            DeckId::B => 'B',
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Transport commands applied to the engine under its lock
pub enum AudioCommand {
    /// Swap in a source built outside the lock
    Load(DeckId, PreparedSource),
    Start(DeckId),
    Stop(DeckId),
    /// Seek to an absolute time in seconds
    Seek(DeckId, f64),
    /// Seek to a fraction of the track
    SeekRelative(DeckId, f64),
}

impl fmt::Debug for AudioCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCommand::Load(deck, source) => f
                .debug_tuple("Load")
                .field(deck)
                .field(&source.transport().total())
                .finish(),
            AudioCommand::Start(deck) => f.debug_tuple("Start").field(deck).finish(),
            AudioCommand::Stop(deck) => f.debug_tuple("Stop").field(deck).finish(),
            AudioCommand::Seek(deck, secs) => f.debug_tuple("Seek").field(deck).field(secs).finish(),
            AudioCommand::SeekRelative(deck, pos) => {
                f.debug_tuple("SeekRelative").field(deck).field(pos).finish()
            }
        }
    }
}

/// Audio engine state (rendered by the audio callback)
pub struct EngineState {
    decks: [DeckPlayer; DECK_COUNT],
    mixer: Mixer,
    sample_rate: f64,
    block_size: usize,
}

impl EngineState {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            decks: [DeckPlayer::new(sample_rate), DeckPlayer::new(sample_rate)],
            mixer: Mixer::new(DECK_COUNT),
            sample_rate,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn deck(&self, id: DeckId) -> &DeckPlayer {
        &self.decks[id.index()]
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut DeckPlayer {
        &mut self.decks[id.index()]
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Apply a command. Returns the source a load replaced so the caller can
    /// drop it after releasing the lock.
    pub fn handle_command(&mut self, cmd: AudioCommand) -> Option<PreparedSource> {
        match cmd {
            AudioCommand::Load(id, source) => return Some(self.deck_mut(id).install_source(source)),
            AudioCommand::Start(id) => self.deck_mut(id).start(),
            AudioCommand::Stop(id) => self.deck_mut(id).stop(),
            AudioCommand::Seek(id, secs) => self.deck_mut(id).seek(secs),
            AudioCommand::SeekRelative(id, pos) => self.deck_mut(id).seek_relative(pos),
        }
        None
    }
}

impl AudioSource for EngineState {
    fn prepare(&mut self, block_size: usize, sample_rate: f64) {
        self.block_size = block_size.max(1);
        self.sample_rate = sample_rate;
        self.mixer.prepare(&mut self.decks, self.block_size, sample_rate);
    }

    fn pull_block(&mut self, out: &mut [f32]) {
        self.mixer.pull_block(&mut self.decks, out);
    }

    fn release(&mut self) {
        self.mixer.release(&mut self.decks);
    }
}

/// Real-time side of the engine, moved into the host's audio callback
pub struct Renderer {
    state: Arc<Mutex<EngineState>>,
}

impl Renderer {
    /// Render one block of interleaved stereo.
    ///
    /// Never blocks: if the control side holds the lock the block is silent.
    pub fn render(&mut self, out: &mut [f32]) {
        match self.state.try_lock() {
            Some(mut state) => state.pull_block(out),
            None => out.fill(0.0),
        }
    }
}

/// Control handle for the engine
///
/// All methods are safe to call from any non-audio thread while a `Renderer`
/// is running.
pub struct AudioEngine {
    state: Arc<Mutex<EngineState>>,
    decks: [Arc<DeckAtomics>; DECK_COUNT],
    looping: [AtomicBool; DECK_COUNT],
    opener: Arc<dyn SourceOpener>,
    sample_rate: f64,
}

impl AudioEngine {
    /// Create an engine rendering at `sample_rate`, opening sources with
    /// `opener`. Call `prepare` before rendering.
    pub fn new(sample_rate: f64, opener: Arc<dyn SourceOpener>) -> Self {
        let state = EngineState::new(sample_rate);
        let decks = [state.deck(DeckId::A).atomics(), state.deck(DeckId::B).atomics()];
        Self {
            state: Arc::new(Mutex::new(state)),
            decks,
            looping: [AtomicBool::new(false), AtomicBool::new(false)],
            opener,
            sample_rate,
        }
    }

    /// Handle for the audio callback
    pub fn renderer(&self) -> Renderer {
        Renderer {
            state: Arc::clone(&self.state),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Prepare decks and mixer for the host's block size
    pub fn prepare(&self, block_size: usize) {
        self.state.lock().prepare(block_size, self.sample_rate);
        tracing::info!(
            "Engine prepared: {} frames at {} Hz",
            block_size,
            self.sample_rate
        );
    }

    /// Release decks and mixer. Safe to call more than once.
    pub fn release(&self) {
        self.state.lock().release();
    }

    fn apply(&self, cmd: AudioCommand) {
        let replaced = self.state.lock().handle_command(cmd);
        // Lock is released; tear down any replaced source here
        drop(replaced);
    }

    fn atomics(&self, deck: DeckId) -> &DeckAtomics {
        &self.decks[deck.index()]
    }

    /// Open and load a source into a deck.
    ///
    /// Opening and decoding happen before the engine lock is taken. On error
    /// the deck keeps playing whatever it had.
    pub fn load_source(&self, deck: DeckId, identifier: &str) -> Result<(), OpenError> {
        let reader = match self.opener.open(identifier) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!("Deck {}: failed to load {}: {}", deck, identifier, e);
                return Err(e);
            }
        };

        let block_size = self.state.lock().block_size();
        let source = PreparedSource::new(
            reader,
            self.sample_rate,
            block_size,
            self.atomics(deck).speed(),
        );
        self.apply(AudioCommand::Load(deck, source));

        tracing::info!("Deck {}: loaded {}", deck, identifier);
        Ok(())
    }

    /// Set deck gain (0.0 = mute, 1.0 = unity). Lock-free.
    pub fn set_gain(&self, deck: DeckId, gain: f32) -> Result<(), AudioError> {
        self.atomics(deck).set_gain(gain)
    }

    /// Set deck speed multiplier. Lock-free.
    pub fn set_speed(&self, deck: DeckId, speed: f32) -> Result<(), AudioError> {
        self.atomics(deck).set_speed(speed)
    }

    pub fn seek_absolute(&self, deck: DeckId, seconds: f64) {
        self.apply(AudioCommand::Seek(deck, seconds));
    }

    pub fn seek_relative(&self, deck: DeckId, fraction: f64) {
        self.apply(AudioCommand::SeekRelative(deck, fraction));
    }

    pub fn start(&self, deck: DeckId) {
        self.apply(AudioCommand::Start(deck));
    }

    pub fn stop(&self, deck: DeckId) {
        self.apply(AudioCommand::Stop(deck));
    }

    /// Playhead as a fraction of the track. Lock-free.
    pub fn position_relative(&self, deck: DeckId) -> f64 {
        self.atomics(deck).position_relative()
    }

    /// Status snapshot. Lock-free.
    pub fn deck_state(&self, deck: DeckId) -> DeckState {
        self.atomics(deck).snapshot(self.sample_rate)
    }

    /// Enable or disable restart-at-end for a deck
    pub fn set_looping(&self, deck: DeckId, enabled: bool) {
        self.looping[deck.index()].store(enabled, Ordering::Relaxed);
    }

    pub fn is_looping(&self, deck: DeckId) -> bool {
        self.looping[deck.index()].load(Ordering::Relaxed)
    }

    /// Periodic end-of-track policy, called from a control-side timer.
    ///
    /// A looping deck that reached the end is sent back to the start and
    /// restarted; any other deck at the end is stopped. Returns the decks
    /// that were restarted.
    pub fn tick(&self) -> Vec<DeckId> {
        let mut restarted = Vec::new();

        for deck in DeckId::ALL {
            let atomics = self.atomics(deck);
            if !atomics.is_loaded() || atomics.position_relative() < 1.0 {
                continue;
            }

            if self.is_looping(deck) {
                self.seek_absolute(deck, 0.0);
                self.start(deck);
                tracing::debug!("Deck {}: looped", deck);
                restarted.push(deck);
            } else if atomics.is_playing() {
                self.stop(deck);
            }
        }

        restarted
    }
}
