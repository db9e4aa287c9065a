//! Encoders fed by the recorder
//!
//! `WavEncoder` keeps disk I/O off the real-time thread: `encode` only
//! pushes into a ring buffer, a writer thread drains it into `hound`.

use super::buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};
use crate::config::{EncodingFormat, SampleFormat};
use crate::error::{AudioError, Result};
use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds of audio the ring buffer can hold before samples are dropped
const RING_SECONDS: usize = 2;

/// Samples the writer thread drains per iteration
const WRITER_CHUNK: usize = 4096;

/// Sink for captured audio, owned exclusively by one recorder
pub trait Encoder: Send {
    /// Accept interleaved samples. Called on the real-time thread.
    fn encode(&mut self, samples: &[f32]) -> Result<()>;

    /// Flush and close. Further calls are no-ops.
    fn finish(&mut self) -> Result<()>;
}

/// Creates encoders for a recorder's file target
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        path: &Path,
        encoding: EncodingFormat,
        sample_format: SampleFormat,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Box<dyn Encoder>>;
}

/// Factory producing [`WavEncoder`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct WavEncoderFactory;

impl EncoderFactory for WavEncoderFactory {
    fn create(
        &self,
        path: &Path,
        encoding: EncodingFormat,
        sample_format: SampleFormat,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Box<dyn Encoder>> {
        if encoding != EncodingFormat::Wav {
            return Err(AudioError::Backend(format!("{encoding:?} encoding is not supported")));
        }
        Ok(Box::new(WavEncoder::create(path, sample_format, channels, sample_rate)?))
    }
}

pub struct WavEncoder {
    producer: AudioProducer,
    running: Arc<AtomicBool>,
    writer: Option<JoinHandle<Result<()>>>,
    dropped_samples: u64,
}

impl WavEncoder {
    pub fn create(path: &Path, sample_format: SampleFormat, channels: u16, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: sample_format.bits_per_sample(),
            sample_format: match sample_format {
                SampleFormat::F32 => hound::SampleFormat::Float,
                _ => hound::SampleFormat::Int,
            },
        };
        let writer = WavWriter::create(path, spec)?;

        let capacity = sample_rate as usize * channels as usize * RING_SECONDS;
        let (producer, consumer) = AudioRingBuffer::new(capacity.max(WRITER_CHUNK)).split();
        let running = Arc::new(AtomicBool::new(true));

        let handle = std::thread::Builder::new()
            .name("wav-writer".into())
            .spawn({
                let running = Arc::clone(&running);
                move || drain(writer, consumer, running, sample_format)
            })?;

        debug!(path = %path.display(), ?sample_format, channels, sample_rate, "WAV encoder opened");
        Ok(Self {
            producer,
            running,
            writer: Some(handle),
            dropped_samples: 0,
        })
    }

    /// Samples lost because the writer fell behind
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }
}

impl Encoder for WavEncoder {
    fn encode(&mut self, samples: &[f32]) -> Result<()> {
        let written = self.producer.write(samples);
        self.dropped_samples += (samples.len() - written) as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(handle) = self.writer.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        handle
            .join()
            .map_err(|_| AudioError::Backend("WAV writer thread panicked".into()))??;
        if self.dropped_samples > 0 {
            warn!(dropped = self.dropped_samples, "WAV writer fell behind, samples dropped");
        }
        debug!("WAV encoder finished");
        Ok(())
    }
}

impl Drop for WavEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to finalize WAV file: {}", e);
        }
    }
}

fn drain(
    mut writer: WavWriter<BufWriter<File>>,
    mut consumer: AudioConsumer,
    running: Arc<AtomicBool>,
    sample_format: SampleFormat,
) -> Result<()> {
    let mut chunk = vec![0.0f32; WRITER_CHUNK];
    loop {
        let n = consumer.read(&mut chunk);
        for &sample in &chunk[..n] {
            write_sample(&mut writer, sample, sample_format)?;
        }
        if n == 0 {
            if !running.load(Ordering::Acquire) && consumer.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
    writer.finalize()?;
    Ok(())
}

fn write_sample(writer: &mut WavWriter<BufWriter<File>>, sample: f32, format: SampleFormat) -> Result<()> {
    let s = sample.clamp(-1.0, 1.0);
    match format {
        SampleFormat::F32 => writer.write_sample(s)?,
        // hound stores 8-bit samples offset to unsigned
        SampleFormat::U8 => writer.write_sample((s * i8::MAX as f32) as i8)?,
        SampleFormat::S16 => writer.write_sample((s * i16::MAX as f32) as i16)?,
        SampleFormat::S24 => writer.write_sample((s * 8_388_607.0) as i32)?,
        SampleFormat::S32 => writer.write_sample((s as f64 * i32::MAX as f64) as i32)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_encoder_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let mut encoder = WavEncoderFactory
            .create(&path, EncodingFormat::Wav, SampleFormat::S16, 2, 16000)
            .unwrap();
        encoder.encode(&[0.5, -0.5, 0.25, -0.25]).unwrap();
        encoder.encode(&[1.0, -1.0]).unwrap();
        encoder.finish().unwrap();
        encoder.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 16000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![16383, -16383, 8191, -8191, 32767, -32767]);
    }

    #[test]
    fn test_float_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");

        let mut encoder = WavEncoder::create(&path, SampleFormat::F32, 1, 8000).unwrap();
        encoder.encode(&[0.125, -0.75]).unwrap();
        encoder.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.125, -0.75]);
    }

    #[test]
    fn test_unsupported_encoding_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = WavEncoderFactory.create(
            &dir.path().join("out.mp3"),
            EncodingFormat::Mp3,
            SampleFormat::S16,
            1,
            44100,
        );
        assert!(matches!(result, Err(AudioError::Backend(_))));
    }

    #[test]
    fn test_bad_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        assert!(WavEncoderFactory
            .create(&path, EncodingFormat::Wav, SampleFormat::S16, 1, 44100)
            .is_err());
    }
}
