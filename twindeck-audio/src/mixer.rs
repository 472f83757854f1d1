//! Mixer implementation - sums independently controlled sources

/// Pull-based audio source driven by the host callback
///
/// Blocks are interleaved stereo; `block_size` counts frames.
pub trait AudioSource: Send {
    /// Prepare for blocks of up to `block_size` frames at `sample_rate`.
    /// May allocate; never called from the audio callback.
    fn prepare(&mut self, block_size: usize, sample_rate: f64);

    /// Fill the whole of `out`, padding with silence as needed
    fn pull_block(&mut self, out: &mut [f32]);

    /// Free resources acquired in `prepare`. Idempotent.
    fn release(&mut self);
}

/// Sums the output of a fixed set of inputs into one buffer
///
/// No headroom compensation is applied: keeping the sum below full scale is
/// up to the per-input gains.
pub struct Mixer {
    input_count: usize,
    /// Per-input render buffer (interleaved stereo)
    scratch: Vec<f32>,
    block_size: usize,
}

impl Mixer {
    /// Create a mixer for exactly `input_count` inputs
    pub fn new(input_count: usize) -> Self {
        Self {
            input_count,
            scratch: Vec::new(),
            block_size: 0,
        }
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn is_prepared(&self) -> bool {
        self.block_size > 0
    }

    /// Prepare every input and size the scratch buffer
    pub fn prepare<S: AudioSource>(&mut self, inputs: &mut [S], block_size: usize, sample_rate: f64) {
        debug_assert_eq!(inputs.len(), self.input_count);
        self.block_size = block_size.max(1);
        self.scratch = vec![0.0; self.block_size * 2];
        for input in inputs.iter_mut() {
            input.prepare(self.block_size, sample_rate);
        }
        tracing::debug!(
            "Mixer prepared: {} inputs, {} frames at {} Hz",
            self.input_count,
            self.block_size,
            sample_rate
        );
    }

    /// Mix one block from all inputs into `output`.
    ///
    /// Outputs silence if `prepare` has not been called. Blocks longer than
    /// the prepared size are rendered in prepared-size chunks.
    pub fn pull_block<S: AudioSource>(&mut self, inputs: &mut [S], output: &mut [f32]) {
        output.fill(0.0);
        if !self.is_prepared() {
            return;
        }

        let chunk_len = self.scratch.len();
        for chunk in output.chunks_mut(chunk_len) {
            let scratch = &mut self.scratch[..chunk.len()];
            for input in inputs.iter_mut().take(self.input_count) {
                input.pull_block(scratch);
                for (out, sample) in chunk.iter_mut().zip(scratch.iter()) {
                    *out += *sample;
                }
            }
        }
    }

    /// Release every input and the scratch buffer
    pub fn release<S: AudioSource>(&mut self, inputs: &mut [S]) {
        for input in inputs.iter_mut() {
            input.release();
        }
        if self.is_prepared() {
            self.scratch = Vec::new();
            self.block_size = 0;
            tracing::debug!("Mixer released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::DeckPlayer;
    use crate::error::OpenError;
    use crate::source::{MemorySource, SourceOpener, SourceReader};

    /// Source producing a constant value
    struct Dc {
        value: f32,
        prepared: usize,
        released: usize,
    }

    impl Dc {
        fn new(value: f32) -> Self {
            Self {
                value,
                prepared: 0,
                released: 0,
            }
        }
    }

    impl AudioSource for Dc {
        fn prepare(&mut self, _block_size: usize, _sample_rate: f64) {
            self.prepared += 1;
        }

        fn pull_block(&mut self, out: &mut [f32]) {
            out.fill(self.value);
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    struct OneSource(MemorySource);

    impl SourceOpener for OneSource {
        fn open(&self, _identifier: &str) -> Result<Box<dyn SourceReader>, OpenError> {
            Ok(Box::new(self.0.clone()))
        }
    }

    fn noise(frames: usize, seed: u32) -> MemorySource {
        // Small LCG so the test needs no extra crates
        let mut state = seed;
        let samples = (0..frames * 2)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect();
        MemorySource::stereo(samples, 48000.0)
    }

    fn deck_with(source: MemorySource, gain: f32, speed: f32, seek: f64) -> DeckPlayer {
        let mut deck = DeckPlayer::new(44100.0);
        deck.prepare(128, 44100.0);
        deck.load("track", &OneSource(source)).unwrap();
        deck.set_gain(gain).unwrap();
        deck.set_speed(speed).unwrap();
        deck.seek_relative(seek);
        deck.start();
        deck
    }

    #[test]
    fn test_unprepared_mixer_is_silent() {
        let mut mixer = Mixer::new(2);
        let mut inputs = [Dc::new(0.2), Dc::new(0.3)];
        let mut out = [1.0f32; 16];

        mixer.pull_block(&mut inputs, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sums_inputs() {
        let mut mixer = Mixer::new(2);
        let mut inputs = [Dc::new(0.2), Dc::new(0.3)];
        mixer.prepare(&mut inputs, 8, 44100.0);

        let mut out = [0.0f32; 16];
        mixer.pull_block(&mut inputs, &mut out);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_no_headroom_compensation() {
        let mut mixer = Mixer::new(2);
        let mut inputs = [Dc::new(0.8), Dc::new(0.7)];
        mixer.prepare(&mut inputs, 8, 44100.0);

        let mut out = [0.0f32; 16];
        mixer.pull_block(&mut inputs, &mut out);
        assert!(out.iter().all(|&s| (s - 1.5).abs() < 1e-6));
    }

    #[test]
    fn test_oversized_output_is_chunked() {
        let mut mixer = Mixer::new(2);
        let mut inputs = [Dc::new(0.25), Dc::new(0.25)];
        mixer.prepare(&mut inputs, 4, 44100.0);

        let mut out = [0.0f32; 22];
        mixer.pull_block(&mut inputs, &mut out);
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_prepare_and_release_propagate() {
        let mut mixer = Mixer::new(2);
        let mut inputs = [Dc::new(0.0), Dc::new(0.0)];

        mixer.prepare(&mut inputs, 64, 48000.0);
        assert!(inputs.iter().all(|i| i.prepared == 1));

        mixer.release(&mut inputs);
        mixer.release(&mut inputs);
        assert!(!mixer.is_prepared());
        assert!(inputs.iter().all(|i| i.released == 2));
    }

    #[test]
    fn test_mix_equals_sum_of_isolated_decks() {
        let a = noise(20_000, 1);
        let b = noise(20_000, 2);

        // Identical deck pairs: one pair pulled alone, one through the mixer
        let mut solo_a = deck_with(a.clone(), 0.8, 1.0, 0.1);
        let mut solo_b = deck_with(b.clone(), 0.6, 1.37, 0.4);
        let mut decks = [deck_with(a, 0.8, 1.0, 0.1), deck_with(b, 0.6, 1.37, 0.4)];

        let mut mixer = Mixer::new(2);
        mixer.prepare(&mut decks, 128, 44100.0);

        let mut buf_a = vec![0.0f32; 256];
        let mut buf_b = vec![0.0f32; 256];
        let mut mixed = vec![0.0f32; 256];

        for _ in 0..20 {
            solo_a.pull_block(&mut buf_a);
            solo_b.pull_block(&mut buf_b);
            mixer.pull_block(&mut decks, &mut mixed);

            for i in 0..mixed.len() {
                assert!(
                    (mixed[i] - (buf_a[i] + buf_b[i])).abs() < 1e-6,
                    "sample {} differs",
                    i
                );
            }
        }
    }
}
