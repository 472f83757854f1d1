//! Audio file loading and decoding

use crate::uri::identifier_path;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use twindeck_audio::{MemorySource, OpenError, SourceOpener, SourceReader};

/// Audio file loader using Symphonia
///
/// Tracks are decoded in full and kept at their native sample rate; the deck
/// converts to the output rate while playing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackLoader;

impl TrackLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and decode a track from a path or `file://` URI
    pub fn load(&self, identifier: &str) -> Result<MemorySource, OpenError> {
        let mut format = self.probe(identifier)?;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| unsupported(identifier, "no audio track"))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| unsupported(identifier, &e.to_string()))?;

        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count());

        // Decode all samples
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    tracing::debug!("Stopped reading {}: {}", identifier, e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("Skipping bad packet in {}: {}", identifier, e);
                    continue;
                }
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count());

            // Convert to f32 interleaved
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        let channels = channels.unwrap_or(2).max(1);
        let sample_rate = sample_rate.unwrap_or(44100);
        let frames = samples.len() / channels;

        if frames == 0 {
            return Err(unsupported(identifier, "no decodable audio"));
        }

        tracing::info!(
            "Decoded {}: {} frames, {} ch at {} Hz",
            identifier,
            frames,
            channels,
            sample_rate
        );

        Ok(MemorySource::new(
            Arc::new(samples),
            channels,
            sample_rate as f64,
        ))
    }

    /// Track length in seconds.
    ///
    /// Uses the container's frame count when it has one, otherwise decodes.
    pub fn duration_secs(&self, identifier: &str) -> Result<f64, OpenError> {
        let format = self.probe(identifier)?;

        let known = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .and_then(|t| Some((t.codec_params.n_frames?, t.codec_params.sample_rate?)));

        match known {
            Some((frames, rate)) if rate > 0 => Ok(frames as f64 / rate as f64),
            _ => {
                let source = self.load(identifier)?;
                Ok(source.length_in_frames() as f64 / source.sample_rate())
            }
        }
    }

    /// Open the file and probe its container format
    fn probe(&self, identifier: &str) -> Result<Box<dyn FormatReader>, OpenError> {
        let path = identifier_path(identifier);

        let file = std::fs::File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OpenError::NotFound(identifier.to_string()),
            _ => OpenError::IoFailure(format!("{}: {}", identifier, e)),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = Path::new(&path).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| unsupported(identifier, &e.to_string()))?;

        Ok(probed.format)
    }
}

fn unsupported(identifier: &str, reason: &str) -> OpenError {
    OpenError::UnsupportedFormat(format!("{}: {}", identifier, reason))
}

impl SourceOpener for TrackLoader {
    fn open(&self, identifier: &str) -> Result<Box<dyn SourceReader>, OpenError> {
        Ok(Box::new(self.load(identifier)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn id(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.wav");

        let result = TrackLoader::new().load(&id(&path));
        assert_eq!(result.unwrap_err(), OpenError::NotFound(id(&path)));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"this is not audio at all, just some text").unwrap();

        let result = TrackLoader::new().load(&id(&path));
        assert!(matches!(result, Err(OpenError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_directory_is_not_a_track() {
        let dir = TempDir::new().unwrap();
        let result = TrackLoader::new().load(&id(dir.path()));
        assert!(matches!(
            result,
            Err(OpenError::UnsupportedFormat(_)) | Err(OpenError::IoFailure(_))
        ));
    }

    #[test]
    fn test_decodes_mono_wav_at_native_rate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<i16> = (0..2205).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        write_wav(&path, 1, 22050, &samples);

        let mut source = TrackLoader::new().load(&id(&path)).unwrap();
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 22050.0);
        assert_eq!(source.length_in_frames(), 2205);

        let mut out = [0.0f32; 4];
        assert_eq!(source.read_frames(0, &mut out), 2);
        assert_eq!(out, [0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_decodes_stereo_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let samples: Vec<i16> = (0..1000).flat_map(|_| [8192i16, -8192]).collect();
        write_wav(&path, 2, 48000, &samples);

        let mut source = TrackLoader::new().load(&id(&path)).unwrap();
        assert_eq!(source.channels(), 2);
        assert_eq!(source.length_in_frames(), 1000);

        let mut out = [0.0f32; 2];
        source.read_frames(500, &mut out);
        assert_eq!(out, [0.25, -0.25]);
    }

    #[test]
    fn test_empty_wav_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1, 44100, &[]);

        let result = TrackLoader::new().load(&id(&path));
        assert!(matches!(result, Err(OpenError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_file_uri_with_escapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("my track.wav");
        write_wav(&path, 1, 44100, &[1000; 441]);

        let uri = format!("file://{}", id(&path).replace(' ', "%20"));
        let source = TrackLoader::new().load(&uri).unwrap();
        assert_eq!(source.length_in_frames(), 441);
    }

    #[test]
    fn test_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("two_seconds.wav");
        write_wav(&path, 1, 8000, &vec![0; 16000]);

        let secs = TrackLoader::new().duration_secs(&id(&path)).unwrap();
        assert!((secs - 2.0).abs() < 1e-9);

        let missing = PathBuf::from(dir.path()).join("gone.wav");
        assert!(matches!(
            TrackLoader::new().duration_secs(&id(&missing)),
            Err(OpenError::NotFound(_))
        ));
    }

    #[test]
    fn test_opener_returns_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 1, 44100, &[0; 100]);

        let opener: &dyn SourceOpener = &TrackLoader::new();
        let reader = opener.open(&id(&path)).unwrap();
        assert_eq!(reader.length_in_frames(), 100);
        assert_eq!(reader.sample_rate(), 44100.0);
    }
}
