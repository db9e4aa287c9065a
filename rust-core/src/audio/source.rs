//! Sample sources pulled by the player

use crate::error::{AudioError, Result};
use std::path::Path;

/// Pull-based provider of interleaved `f32` frames.
///
/// Implementations are driven from the real-time thread and must not block.
pub trait SampleSource: Send {
    /// Fill `buffer` with whole frames; returns the number of frames written.
    /// Fewer frames than requested (or zero) means the end of the stream.
    fn read(&mut self, buffer: &mut [f32]) -> Result<usize>;

    /// Reposition to an absolute frame offset
    fn seek(&mut self, frame: u64) -> Result<()>;

    fn can_seek(&self) -> bool;

    /// Total length in frames
    fn length(&self) -> u64;

    /// Interleaved channels per frame
    fn channels(&self) -> usize;

    /// Frames per second of the source material
    fn sample_rate(&self) -> u32;
}

/// Fully decoded audio held in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    position: usize,
    seekable: bool,
}

impl MemorySource {
    /// Wrap interleaved samples. Trailing samples that don't fill a frame are dropped.
    pub fn new(mut samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AudioError::InvalidArgument("channel count must be non-zero".into()));
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidArgument("sample rate must be non-zero".into()));
        }
        samples.truncate(samples.len() - samples.len() % channels);
        Ok(Self {
            samples,
            channels,
            sample_rate,
            position: 0,
            seekable: true,
        })
    }

    /// Decode a WAV file into memory
    pub fn from_wav(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Self::new(samples, spec.channels as usize, spec.sample_rate)
    }

    /// Behave like a live stream that cannot be repositioned
    pub fn non_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Current read position in frames
    pub fn position(&self) -> u64 {
        self.position as u64
    }
}

impl SampleSource for MemorySource {
    fn read(&mut self, buffer: &mut [f32]) -> Result<usize> {
        let start = self.position * self.channels;
        let wanted = buffer.len() / self.channels;
        let available = (self.samples.len() - start) / self.channels;
        let frames = wanted.min(available);
        let len = frames * self.channels;

        buffer[..len].copy_from_slice(&self.samples[start..start + len]);
        self.position += frames;
        Ok(frames)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        if !self.seekable {
            return Err(AudioError::InvalidOperation("source is not seekable".into()));
        }
        let frame = frame as usize;
        if frame > self.samples.len() / self.channels {
            return Err(AudioError::Source(format!(
                "seek to frame {frame} past end ({} frames)",
                self.length()
            )));
        }
        self.position = frame;
        Ok(())
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }

    fn length(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_until_end() {
        let mut source = MemorySource::new((0..10).map(|v| v as f32).collect(), 2, 48000).unwrap();
        assert_eq!(source.length(), 5);

        let mut buffer = [0.0f32; 6];
        assert_eq!(source.read(&mut buffer).unwrap(), 3);
        assert_eq!(buffer, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(source.read(&mut buffer).unwrap(), 2);
        assert_eq!(&buffer[..4], &[6.0, 7.0, 8.0, 9.0]);

        assert_eq!(source.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_seek() {
        let mut source = MemorySource::new(vec![0.0, 1.0, 2.0, 3.0], 1, 8000).unwrap();
        source.seek(3).unwrap();
        let mut buffer = [0.0f32; 4];
        assert_eq!(source.read(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], 3.0);
        assert!(source.seek(5).is_err());
    }

    #[test]
    fn test_non_seekable() {
        let mut source = MemorySource::new(vec![0.0; 8], 1, 8000).unwrap().non_seekable();
        assert!(!source.can_seek());
        assert!(matches!(source.seek(0), Err(AudioError::InvalidOperation(_))));
    }

    #[test]
    fn test_partial_frame_dropped() {
        let source = MemorySource::new(vec![0.0; 7], 2, 8000).unwrap();
        assert_eq!(source.length(), 3);
        assert_eq!(source.channels(), 2);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            MemorySource::new(vec![0.0; 4], 1, 0),
            Err(AudioError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [0i16, 16384, -16384, 32767] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let source = MemorySource::from_wav(&path).unwrap();
        assert_eq!(source.length(), 4);
        assert_eq!(source.sample_rate(), 16000);
        assert!((source.samples[1] - 0.5).abs() < 1e-6);
        assert!((source.samples[2] + 0.5).abs() < 1e-6);
    }
}
