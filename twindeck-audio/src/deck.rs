//! Deck player - transport, resampler and gain for one deck

use crate::error::{AudioError, OpenError};
use crate::mixer::AudioSource;
use crate::resampler::{validate_speed, Resampler};
use crate::source::{SourceOpener, SourceReader};
use crate::transport::{Transport, TransportState};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Block size used until the host calls `prepare`
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Snapshot of a deck for status display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckState {
    pub loaded: bool,
    pub playing: bool,
    pub position_frames: u64,
    pub total_frames: u64,
    pub gain: f32,
    pub speed: f32,
    pub source_sample_rate: f64,
    pub output_sample_rate: f64,
}

impl DeckState {
    /// Playhead in seconds of source time
    pub fn position_secs(&self) -> f64 {
        if self.source_sample_rate <= 0.0 {
            return 0.0;
        }
        self.position_frames as f64 / self.source_sample_rate
    }

    /// Source length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.source_sample_rate <= 0.0 {
            return 0.0;
        }
        self.total_frames as f64 / self.source_sample_rate
    }

    pub fn position_relative(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.position_frames as f64 / self.total_frames as f64
    }
}

/// Lock-free deck state shared with the control context
///
/// Gain and speed are written by the control side and read by the audio side
/// once per block. Position, length and transport state flow the other way:
/// the deck publishes them after every block and every transport change.
/// Floats are stored as their bit patterns. All accesses are `Relaxed`; each
/// field is independent.
#[derive(Debug)]
pub struct DeckAtomics {
    position: AtomicU64,
    total: AtomicU64,
    state: AtomicU8,
    source_rate: AtomicU64,
    gain: AtomicU32,
    speed: AtomicU32,
}

impl Default for DeckAtomics {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckAtomics {
    pub fn new() -> Self {
        Self {
            position: AtomicU64::new(0),
            total: AtomicU64::new(0),
            state: AtomicU8::new(TransportState::Empty.as_u8()),
            source_rate: AtomicU64::new(0f64.to_bits()),
            gain: AtomicU32::new(1.0f32.to_bits()),
            speed: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn transport_state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.transport_state() == TransportState::Playing
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.transport_state() != TransportState::Empty
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Relaxed))
    }

    pub fn source_rate(&self) -> f64 {
        f64::from_bits(self.source_rate.load(Ordering::Relaxed))
    }

    pub fn position_relative(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.position().min(total) as f64 / total as f64
    }

    /// Validate and store a gain for the next block
    pub fn set_gain(&self, gain: f32) -> Result<(), AudioError> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(AudioError::invalid("gain", gain as f64));
        }
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Validate and store a speed multiplier for the next block
    pub fn set_speed(&self, multiplier: f32) -> Result<(), AudioError> {
        let speed = validate_speed(multiplier)?;
        self.speed.store(speed.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Build a status snapshot
    pub fn snapshot(&self, output_sample_rate: f64) -> DeckState {
        let state = self.transport_state();
        DeckState {
            loaded: state != TransportState::Empty,
            playing: state == TransportState::Playing,
            position_frames: self.position(),
            total_frames: self.total(),
            gain: self.gain(),
            speed: self.speed(),
            source_sample_rate: self.source_rate(),
            output_sample_rate,
        }
    }

    fn publish(&self, transport: &Transport) {
        self.position.store(transport.position(), Ordering::Relaxed);
        self.total.store(transport.total(), Ordering::Relaxed);
        self.state
            .store(transport.state().as_u8(), Ordering::Relaxed);
        let rate = transport.sample_rate().unwrap_or(0.0);
        self.source_rate.store(rate.to_bits(), Ordering::Relaxed);
    }
}

/// A source built off to the side, ready to be swapped into a deck
pub struct PreparedSource {
    resampler: Resampler,
}

impl PreparedSource {
    /// Build transport and resampler for `reader`. Allocates; call this
    /// outside any audio lock.
    pub fn new(
        reader: Box<dyn SourceReader>,
        output_rate: f64,
        block_size: usize,
        speed: f32,
    ) -> Self {
        let mut resampler = Resampler::new(Transport::with_reader(reader), output_rate, block_size);
        resampler.apply_speed(speed);
        Self { resampler }
    }

    pub fn transport(&self) -> &Transport {
        self.resampler.transport()
    }
}

/// A single deck: transport, resampler and gain
pub struct DeckPlayer {
    source: Resampler,
    atomics: Arc<DeckAtomics>,
    output_rate: f64,
    block_size: usize,
    prepared: bool,
}

impl DeckPlayer {
    /// Create an empty deck rendering at `output_rate`
    pub fn new(output_rate: f64) -> Self {
        Self::with_atomics(output_rate, Arc::new(DeckAtomics::new()))
    }

    /// Create an empty deck publishing into existing shared state
    pub fn with_atomics(output_rate: f64, atomics: Arc<DeckAtomics>) -> Self {
        let deck = Self {
            source: Resampler::new(Transport::new(), output_rate, DEFAULT_BLOCK_SIZE),
            atomics,
            output_rate,
            block_size: DEFAULT_BLOCK_SIZE,
            prepared: true,
        };
        deck.atomics.publish(deck.source.transport());
        deck
    }

    /// Shared state handle for lock-free status and parameter access
    pub fn atomics(&self) -> Arc<DeckAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Open `identifier` and load it, replacing the current source.
    ///
    /// On failure the deck is left exactly as it was.
    pub fn load(&mut self, identifier: &str, opener: &dyn SourceOpener) -> Result<(), OpenError> {
        let reader = opener.open(identifier)?;
        let source = self.prepare_source(reader);
        drop(self.install_source(source));
        tracing::info!("Loaded {}", identifier);
        Ok(())
    }

    /// Build transport and resampler for `reader` without touching the deck
    pub fn prepare_source(&self, reader: Box<dyn SourceReader>) -> PreparedSource {
        PreparedSource::new(reader, self.output_rate, self.block_size, self.atomics.speed())
    }

    /// Swap a prepared source in, returning the previous one.
    ///
    /// The caller should drop the returned source outside any audio lock.
    pub fn install_source(&mut self, source: PreparedSource) -> PreparedSource {
        let mut resampler = source.resampler;
        if resampler.max_block() != self.block_size || resampler.output_rate() != self.output_rate {
            // Host format changed since the source was built
            resampler.prepare(self.block_size, self.output_rate);
        }
        let previous = std::mem::replace(&mut self.source, resampler);
        self.atomics.publish(self.source.transport());
        PreparedSource {
            resampler: previous,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.source.transport().is_loaded()
    }

    pub fn is_playing(&self) -> bool {
        self.source.transport().is_playing()
    }

    pub fn transport_state(&self) -> TransportState {
        self.source.transport().state()
    }

    /// Start playback; ignored when nothing is loaded
    pub fn start(&mut self) {
        self.source.transport_mut().start();
        self.atomics.publish(self.source.transport());
    }

    /// Stop playback, keeping the position
    pub fn stop(&mut self) {
        self.source.transport_mut().stop();
        self.atomics.publish(self.source.transport());
    }

    /// Seek to an absolute time in seconds
    pub fn seek(&mut self, seconds: f64) {
        self.source.seek_seconds(seconds);
        self.atomics.publish(self.source.transport());
    }

    /// Seek to a fraction of the track, clamped to [0, 1]
    pub fn seek_relative(&mut self, fraction: f64) {
        self.source.seek_relative(fraction);
        self.atomics.publish(self.source.transport());
    }

    pub fn position_relative(&self) -> f64 {
        self.source.position_relative()
    }

    /// Set output gain (0.0 = mute, 1.0 = unity)
    pub fn set_gain(&mut self, gain: f32) -> Result<(), AudioError> {
        self.atomics.set_gain(gain)
    }

    pub fn gain(&self) -> f32 {
        self.atomics.gain()
    }

    /// Set speed multiplier, clamped to the supported range
    pub fn set_speed(&mut self, multiplier: f32) -> Result<(), AudioError> {
        self.atomics.set_speed(multiplier)?;
        self.source.apply_speed(self.atomics.speed());
        Ok(())
    }

    pub fn speed(&self) -> f32 {
        self.atomics.speed()
    }

    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    /// Largest block rendered in one resampler pass
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Full state snapshot
    pub fn state(&self) -> DeckState {
        let transport = self.source.transport();
        DeckState {
            loaded: transport.is_loaded(),
            playing: transport.is_playing(),
            position_frames: transport.position(),
            total_frames: transport.total(),
            gain: self.gain(),
            speed: self.speed(),
            source_sample_rate: transport.sample_rate().unwrap_or(0.0),
            output_sample_rate: self.output_rate,
        }
    }
}

impl AudioSource for DeckPlayer {
    fn prepare(&mut self, block_size: usize, sample_rate: f64) {
        self.block_size = block_size.max(1);
        self.output_rate = sample_rate;
        self.source.prepare(self.block_size, sample_rate);
        self.prepared = true;
        tracing::debug!(
            "Deck prepared: {} frames at {} Hz",
            self.block_size,
            sample_rate
        );
    }

    /// Render `gain * resampled source` as interleaved stereo
    fn pull_block(&mut self, out: &mut [f32]) {
        if !self.prepared {
            out.fill(0.0);
            return;
        }

        self.source.apply_speed(self.atomics.speed());
        let gain = self.atomics.gain();

        for chunk in out.chunks_mut(self.block_size * 2) {
            self.source.pull(chunk);
            if gain != 1.0 {
                for sample in chunk.iter_mut() {
                    *sample *= gain;
                }
            }
        }

        self.atomics.publish(self.source.transport());
    }

    fn release(&mut self) {
        if self.prepared {
            self.source.release();
            self.prepared = false;
            tracing::debug!("Deck released");
        }
    }
}

impl Default for DeckPlayer {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::collections::HashMap;

    /// Opener over a fixed set of in-memory sources
    struct TestOpener {
        sources: HashMap<String, MemorySource>,
    }

    impl TestOpener {
        fn new() -> Self {
            Self {
                sources: HashMap::new(),
            }
        }

        fn with(mut self, name: &str, source: MemorySource) -> Self {
            self.sources.insert(name.to_string(), source);
            self
        }
    }

    impl SourceOpener for TestOpener {
        fn open(&self, identifier: &str) -> Result<Box<dyn SourceReader>, OpenError> {
            self.sources
                .get(identifier)
                .map(|s| Box::new(s.clone()) as Box<dyn SourceReader>)
                .ok_or_else(|| OpenError::NotFound(identifier.to_string()))
        }
    }

    fn sine(seconds: f64, rate: f64) -> MemorySource {
        let frames = (seconds * rate) as usize;
        let samples = (0..frames)
            .map(|i| (i as f64 * 440.0 * std::f64::consts::TAU / rate).sin() as f32 * 0.8)
            .collect();
        MemorySource::mono(samples, rate)
    }

    fn constant(value: f32, frames: usize) -> MemorySource {
        MemorySource::mono(vec![value; frames], 44100.0)
    }

    #[test]
    fn test_new_deck_is_empty() {
        let deck = DeckPlayer::new(44100.0);
        let state = deck.state();
        assert!(!state.loaded);
        assert!(!state.playing);
        assert_eq!(state.position_frames, 0);
        assert_eq!(state.total_frames, 0);
        assert_eq!(deck.position_relative(), 0.0);
    }

    #[test]
    fn test_start_on_empty_is_noop() {
        let mut deck = DeckPlayer::new(44100.0);
        deck.start();
        assert!(!deck.is_playing());

        let mut out = vec![1.0f32; 256];
        deck.pull_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_load_resets_to_stopped_start() {
        let opener = TestOpener::new().with("a", constant(0.2, 1000));
        let mut deck = DeckPlayer::new(44100.0);

        deck.load("a", &opener).unwrap();
        assert_eq!(deck.transport_state(), TransportState::Stopped);
        assert_eq!(deck.state().total_frames, 1000);
        assert_eq!(deck.state().position_frames, 0);
    }

    #[test]
    fn test_load_missing_keeps_state() {
        let opener = TestOpener::new().with("a", constant(0.2, 10_000));
        let mut deck = DeckPlayer::new(44100.0);
        deck.load("a", &opener).unwrap();
        deck.set_gain(0.7).unwrap();
        deck.set_speed(1.5).unwrap();
        deck.seek_relative(0.25);
        deck.start();

        let before = deck.state();
        let result = deck.load("missing.wav", &opener);

        assert_eq!(result, Err(OpenError::NotFound("missing.wav".to_string())));
        assert_eq!(deck.state(), before);
        assert!(deck.is_playing());
    }

    #[test]
    fn test_gain_validation() {
        let mut deck = DeckPlayer::new(44100.0);
        assert!(deck.set_gain(-0.1).is_err());
        assert!(deck.set_gain(f32::NAN).is_err());
        assert_eq!(deck.gain(), 1.0);

        deck.set_gain(0.0).unwrap();
        assert_eq!(deck.gain(), 0.0);
        deck.set_gain(1.8).unwrap();
        assert_eq!(deck.gain(), 1.8);
    }

    #[test]
    fn test_speed_validation() {
        let mut deck = DeckPlayer::new(44100.0);
        assert!(matches!(
            deck.set_speed(0.0),
            Err(AudioError::InvalidArgument { parameter: "speed", .. })
        ));
        assert!(deck.set_speed(-2.0).is_err());
        assert_eq!(deck.speed(), 1.0);

        deck.set_speed(100.0).unwrap();
        assert_eq!(deck.speed(), 4.0);
    }

    #[test]
    fn test_relative_seek_bounds() {
        let opener = TestOpener::new().with("a", constant(0.1, 4410));
        let mut deck = DeckPlayer::new(44100.0);
        deck.load("a", &opener).unwrap();

        deck.seek_relative(0.0);
        assert_eq!(deck.position_relative(), 0.0);
        deck.seek_relative(1.0);
        assert_eq!(deck.position_relative(), 1.0);
    }

    #[test]
    fn test_absolute_seek_uses_source_rate() {
        let opener = TestOpener::new().with("a", sine(2.0, 48000.0));
        let mut deck = DeckPlayer::new(44100.0);
        deck.load("a", &opener).unwrap();

        deck.seek(0.5);
        assert_eq!(deck.state().position_frames, 24000);
        assert!((deck.state().position_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_advance_tracks_speed_ratio() {
        let opener = TestOpener::new().with("a", sine(20.0, 48000.0));

        for speed in [0.5f32, 1.0, 1.25, 3.0] {
            let mut deck = DeckPlayer::new(44100.0);
            deck.prepare(256, 44100.0);
            deck.load("a", &opener).unwrap();
            deck.set_speed(speed).unwrap();
            deck.start();

            let mut out = vec![0.0f32; 512];
            for _ in 0..10 {
                deck.pull_block(&mut out);
            }

            let expected = 10.0 * 256.0 * speed as f64 * 48000.0 / 44100.0;
            let actual = deck.state().position_frames as f64;
            assert!(
                (actual - expected).abs() <= 2.0,
                "speed {}: expected ~{}, got {}",
                speed,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_half_gain_scenario() {
        let source = sine(10.0, 44100.0);
        let source_peak = source.peak();
        let opener = TestOpener::new().with("sine", source);

        let mut deck = DeckPlayer::new(44100.0);
        deck.prepare(441, 44100.0);
        deck.load("sine", &opener).unwrap();
        deck.set_gain(0.5).unwrap();
        deck.set_speed(1.0).unwrap();
        deck.start();

        // 500 blocks of 441 frames = 5 seconds
        let mut out = vec![0.0f32; 882];
        let mut peak = 0.0f32;
        for _ in 0..500 {
            deck.pull_block(&mut out);
            peak = out.iter().fold(peak, |p, s| p.max(s.abs()));
        }

        assert!((deck.position_relative() - 0.5).abs() < 1e-3);
        assert!(peak <= 0.5 * source_peak + 1e-6);
        assert!(peak > 0.0);
    }

    #[test]
    fn test_end_of_source_stops_deck() {
        let opener = TestOpener::new().with("a", constant(0.3, 1000));
        let mut deck = DeckPlayer::new(44100.0);
        deck.prepare(256, 44100.0);
        deck.load("a", &opener).unwrap();
        deck.start();

        let mut out = vec![0.0f32; 512];
        for _ in 0..5 {
            deck.pull_block(&mut out);
        }

        assert!(!deck.is_playing());
        assert_eq!(deck.transport_state(), TransportState::Stopped);
        assert_eq!(deck.position_relative(), 1.0);

        deck.pull_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(deck.state().position_frames, 1000);
    }

    #[test]
    fn test_large_block_is_chunked() {
        let opener = TestOpener::new().with("a", constant(0.25, 10_000));
        let mut deck = DeckPlayer::new(44100.0);
        deck.prepare(64, 44100.0);
        deck.load("a", &opener).unwrap();
        deck.start();

        let mut out = vec![0.0f32; 1000];
        deck.pull_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.25));
        assert_eq!(deck.state().position_frames, 500);
    }

    #[test]
    fn test_released_deck_is_silent() {
        let opener = TestOpener::new().with("a", constant(0.25, 10_000));
        let mut deck = DeckPlayer::new(44100.0);
        deck.load("a", &opener).unwrap();
        deck.start();

        deck.release();
        deck.release();

        let mut out = vec![1.0f32; 128];
        deck.pull_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        deck.prepare(64, 44100.0);
        deck.pull_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_atomics_follow_deck() {
        let opener = TestOpener::new().with("a", constant(0.25, 10_000));
        let mut deck = DeckPlayer::new(44100.0);
        let shared = deck.atomics();

        deck.load("a", &opener).unwrap();
        assert!(shared.is_loaded());
        assert_eq!(shared.total(), 10_000);

        deck.start();
        assert!(shared.is_playing());

        let mut out = vec![0.0f32; 200];
        deck.pull_block(&mut out);
        assert_eq!(shared.position(), 100);

        shared.set_gain(0.5).unwrap();
        deck.pull_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.125));

        assert_eq!(shared.snapshot(44100.0), deck.state());
    }
}
