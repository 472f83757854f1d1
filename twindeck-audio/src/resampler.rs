//! Resampler - native rate to output rate with a speed multiplier
//!
//! Linear interpolation between the two nearest source frames. The ratio is
//! `native_rate / output_rate * speed`; a ratio of exactly 1.0 reproduces the
//! source frames bit for bit.

use crate::error::AudioError;
use crate::transport::Transport;

/// Slowest accepted speed multiplier
pub const MIN_SPEED: f32 = 0.1;
/// Fastest accepted speed multiplier
pub const MAX_SPEED: f32 = 4.0;

/// Validate a speed multiplier and clamp it into the supported range
pub fn validate_speed(multiplier: f32) -> Result<f32, AudioError> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(AudioError::invalid("speed", multiplier as f64));
    }
    Ok(multiplier.clamp(MIN_SPEED, MAX_SPEED))
}

/// Wraps a transport and converts it to the output rate
pub struct Resampler {
    transport: Transport,
    output_rate: f64,
    speed: f32,
    /// Stereo frames pulled from the transport but not yet consumed
    scratch: Vec<f32>,
    /// Frames currently held in `scratch`
    available: usize,
    /// Fractional read position relative to the first held frame
    frac: f64,
    /// Largest block (in output frames) `pull` accepts
    max_block: usize,
}

impl Resampler {
    /// Wrap `transport` for output at `output_rate` in blocks of at most
    /// `max_block` frames. Allocates the scratch buffer.
    pub fn new(transport: Transport, output_rate: f64, max_block: usize) -> Self {
        let mut resampler = Self {
            transport,
            output_rate,
            speed: 1.0,
            scratch: Vec::new(),
            available: 0,
            frac: 0.0,
            max_block: 0,
        };
        resampler.prepare(max_block, output_rate);
        resampler
    }

    /// Resize for a new block size / output rate. Not real-time safe.
    pub fn prepare(&mut self, max_block: usize, output_rate: f64) {
        self.output_rate = output_rate;
        self.max_block = max_block.max(1);
        let frames = self.scratch_frames_for(MAX_SPEED);
        self.scratch = vec![0.0; frames * 2];
        self.reset();
    }

    /// Drop the scratch buffer
    pub fn release(&mut self) {
        self.scratch = Vec::new();
        self.max_block = 0;
        self.reset();
    }

    pub fn is_prepared(&self) -> bool {
        self.max_block > 0
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Set the speed multiplier (1.0 = native pitch at the output rate)
    pub fn set_speed(&mut self, multiplier: f32) -> Result<(), AudioError> {
        self.speed = validate_speed(multiplier)?;
        Ok(())
    }

    /// Apply an already validated multiplier (audio path)
    #[inline]
    pub(crate) fn apply_speed(&mut self, multiplier: f32) {
        self.speed = multiplier.clamp(MIN_SPEED, MAX_SPEED);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Source frames consumed per output frame
    pub fn ratio(&self) -> f64 {
        self.ratio_for(self.speed)
    }

    fn ratio_for(&self, speed: f32) -> f64 {
        let native = self.transport.sample_rate().unwrap_or(self.output_rate);
        if self.output_rate <= 0.0 || native <= 0.0 {
            return speed as f64;
        }
        native / self.output_rate * speed as f64
    }

    fn scratch_frames_for(&self, speed: f32) -> usize {
        // Two frames of lookahead plus one of rounding on either side
        (self.max_block as f64 * self.ratio_for(speed)).ceil() as usize + 4
    }

    /// Forget interpolation state (after a seek or a stop)
    pub fn reset(&mut self) {
        self.available = 0;
        self.frac = 0.0;
    }

    pub fn seek_seconds(&mut self, seconds: f64) {
        self.transport.seek_seconds(seconds);
        self.reset();
    }

    pub fn seek_relative(&mut self, fraction: f64) {
        self.transport.seek_relative(fraction);
        self.reset();
    }

    pub fn position_relative(&self) -> f64 {
        self.transport.position_relative()
    }

    /// Fill `out` (interleaved stereo, at most `max_block` frames).
    ///
    /// Writes silence when the transport is not playing or the resampler has
    /// been released.
    pub fn pull(&mut self, out: &mut [f32]) {
        let n = out.len() / 2;
        out[n * 2..].fill(0.0);
        if n == 0 {
            return;
        }
        if !self.transport.is_playing() || n > self.max_block {
            out.fill(0.0);
            return;
        }

        let ratio = self.ratio();

        // Highest held frame index the last output frame interpolates from
        let last = self.frac + (n - 1) as f64 * ratio;
        let mut needed = last.floor() as usize + 1;
        if last.fract() > 0.0 {
            needed += 1;
        }
        self.fill_to(needed);

        for (i, frame) in out.chunks_exact_mut(2).enumerate() {
            let t = self.frac + i as f64 * ratio;
            let index = t.floor() as usize;
            let mu = (t - index as f64) as f32;

            let l0 = self.scratch[index * 2];
            let r0 = self.scratch[index * 2 + 1];
            if mu > 0.0 {
                let l1 = self.scratch[index * 2 + 2];
                let r1 = self.scratch[index * 2 + 3];
                frame[0] = l0 + mu * (l1 - l0);
                frame[1] = r0 + mu * (r1 - r0);
            } else {
                frame[0] = l0;
                frame[1] = r0;
            }
        }

        let end = self.frac + n as f64 * ratio;
        let advance = end.floor() as usize;
        self.frac = end - advance as f64;

        if advance >= self.available {
            // Frames skipped entirely at high ratios still move the playhead
            let skip = advance - self.available;
            self.available = 0;
            self.fill_to(skip);
            self.available = 0;
        } else {
            self.scratch
                .copy_within(advance * 2..self.available * 2, 0);
            self.available -= advance;
        }
    }

    /// Pull from the transport until `frames` frames are held
    fn fill_to(&mut self, frames: usize) {
        let frames = frames.min(self.scratch.len() / 2);
        if frames > self.available {
            let range = self.available * 2..frames * 2;
            self.transport.pull(&mut self.scratch[range]);
            self.available = frames;
        }
    }
}
