//! Decoded source readers - the seam between decoding and playback
//!
//! Decoding itself lives outside the core. A `SourceOpener` turns an
//! identifier (path or `file://` URI) into a `SourceReader`, and the
//! transport only ever sees the reader.

use crate::error::OpenError;
use std::sync::Arc;

/// Random-access reader over a decoded audio source
pub trait SourceReader: Send {
    /// Native sample rate of the source in Hz
    fn sample_rate(&self) -> f64;

    /// Total length in frames (one frame = one sample per channel)
    fn length_in_frames(&self) -> u64;

    /// Read frames starting at `start` into `out` as interleaved stereo.
    ///
    /// Returns the number of frames written, at most `out.len() / 2`, and 0
    /// at or past the end. Frames beyond the returned count are untouched.
    fn read_frames(&mut self, start: u64, out: &mut [f32]) -> usize;
}

/// Opens sources by identifier
pub trait SourceOpener: Send + Sync {
    fn open(&self, identifier: &str) -> Result<Box<dyn SourceReader>, OpenError>;
}

/// Fully decoded source held in memory
///
/// Samples are shared through an `Arc` so a decoded track can be handed to a
/// deck without copying.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Arc<Vec<f32>>,
    channels: usize,
    sample_rate: f64,
}

impl MemorySource {
    /// Wrap interleaved samples with the given channel count.
    ///
    /// A channel count of zero is treated as mono.
    pub fn new(samples: Arc<Vec<f32>>, channels: usize, sample_rate: f64) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Mono source from a plain sample vector
    pub fn mono(samples: Vec<f32>, sample_rate: f64) -> Self {
        Self::new(Arc::new(samples), 1, sample_rate)
    }

    /// Stereo source from interleaved L/R samples
    pub fn stereo(samples: Vec<f32>, sample_rate: f64) -> Self {
        Self::new(Arc::new(samples), 2, sample_rate)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Peak absolute sample value over the whole source
    #[cfg(test)]
    pub(crate) fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

impl SourceReader for MemorySource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn length_in_frames(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    fn read_frames(&mut self, start: u64, out: &mut [f32]) -> usize {
        let total = self.length_in_frames();
        if start >= total {
            return 0;
        }

        let available = (total - start) as usize;
        let count = (out.len() / 2).min(available);
        let first = start as usize;

        for (i, frame) in out.chunks_exact_mut(2).take(count).enumerate() {
            let base = (first + i) * self.channels;
            let left = self.samples[base];
            // Mono is duplicated; channels past the second are dropped
            let right = if self.channels > 1 {
                self.samples[base + 1]
            } else {
                left
            };
            frame[0] = left;
            frame[1] = right;
        }

        count
    }
}
