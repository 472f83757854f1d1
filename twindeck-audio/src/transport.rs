//! Transport - play/stop/seek state machine over a single source

use crate::source::SourceReader;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No source loaded
    #[default]
    Empty,
    Stopped,
    Playing,
}

impl TransportState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            TransportState::Empty => 0,
            TransportState::Stopped => 1,
            TransportState::Playing => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Stopped,
            2 => TransportState::Playing,
            _ => TransportState::Empty,
        }
    }
}

/// Owns one source reader and the playhead over it
///
/// Positions are in source frames at the source's native rate.
pub struct Transport {
    reader: Option<Box<dyn SourceReader>>,
    state: TransportState,
    position: u64,
    total: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self {
            reader: None,
            state: TransportState::Empty,
            position: 0,
            total: 0,
        }
    }

    /// Create a stopped transport positioned at the start of `reader`
    pub fn with_reader(reader: Box<dyn SourceReader>) -> Self {
        let total = reader.length_in_frames();
        Self {
            reader: Some(reader),
            state: TransportState::Stopped,
            position: 0,
            total,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.reader.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Playhead in source frames
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Source length in frames (0 when empty)
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Native sample rate of the loaded source, if any
    pub fn sample_rate(&self) -> Option<f64> {
        self.reader.as_ref().map(|r| r.sample_rate())
    }

    /// Start playback. Ignored when nothing is loaded.
    pub fn start(&mut self) {
        if self.state == TransportState::Stopped {
            self.state = TransportState::Playing;
        }
    }

    /// Stop playback, keeping the playhead where it is
    pub fn stop(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Stopped;
        }
    }

    /// Move the playhead to an absolute frame, clamped to the source
    pub fn seek_frames(&mut self, frame: u64) {
        self.position = frame.min(self.total);
    }

    /// Move the playhead to an absolute time in seconds
    pub fn seek_seconds(&mut self, seconds: f64) {
        let rate = self.sample_rate().unwrap_or(0.0);
        let frame = seconds * rate;
        if frame.is_nan() || frame <= 0.0 {
            self.seek_frames(0);
        } else {
            // Float-to-int casts saturate, so huge values land on total
            self.seek_frames(frame.round() as u64);
        }
    }

    /// Move the playhead to a fraction of the source length
    pub fn seek_relative(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.seek_frames((fraction * self.total as f64).round() as u64);
    }

    /// Playhead as a fraction of the source length, 0 when empty
    pub fn position_relative(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.position as f64 / self.total as f64
    }

    /// Fill `out` (interleaved stereo) from the playhead.
    ///
    /// Returns the number of source frames produced. Readers may return fewer
    /// frames than asked for, so reading continues until the block is full.
    /// Anything not produced is zero-filled. Reaching the end (or a reader
    /// that has nothing more to give) while playing stops the transport with
    /// the playhead pinned at the end.
    pub fn pull(&mut self, out: &mut [f32]) -> usize {
        if self.state != TransportState::Playing {
            out.fill(0.0);
            return 0;
        }

        let Some(reader) = self.reader.as_mut() else {
            out.fill(0.0);
            return 0;
        };

        let requested = out.len() / 2;
        let mut produced = 0;
        let mut exhausted = false;

        while produced < requested && self.position < self.total {
            let read = reader
                .read_frames(self.position, &mut out[produced * 2..requested * 2])
                .min(requested - produced);
            if read == 0 {
                exhausted = true;
                break;
            }
            produced += read;
            self.position = (self.position + read as u64).min(self.total);
        }
        out[produced * 2..].fill(0.0);

        if exhausted || self.position >= self.total {
            self.state = TransportState::Stopped;
            self.position = self.total;
        }

        produced
    }
}
