//! Playback and recording configuration

use crate::error::{AudioError, Result};
use serde::{Deserialize, Serialize};

/// Transport state shared by the player and the recorder.
///
/// For the recorder `Playing` means "actively capturing" and `Paused` means
/// "attached to the feed but discarding".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlaybackState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

/// Sample representation used by encoders and devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S16,
    S24,
    S32,
    #[default]
    F32,
}

impl SampleFormat {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24 => 24,
            SampleFormat::S32 | SampleFormat::F32 => 32,
        }
    }
}

/// Container/codec used when writing captured audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodingFormat {
    #[default]
    Wav,
    Flac,
    Mp3,
    Vorbis,
}

/// Direction of a buffer published on the delivery feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Playback,
    Recording,
    Mixed,
    Loopback,
}

impl Capability {
    /// Whether a capture session should look at buffers of this direction
    pub fn carries_capture(&self) -> bool {
        matches!(self, Capability::Recording | Capability::Mixed)
    }
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Device sample rate in Hz
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: usize,

    pub sample_format: SampleFormat,

    pub encoding_format: EncodingFormat,

    /// Speed multiplier (1.0 = normal, 2.0 = double)
    pub speed: f64,

    /// Restart from frame 0 when the source runs out
    pub looping: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::F32,
            encoding_format: EncodingFormat::Wav,
            speed: 1.0,
            looping: false,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        validate_speed(self.speed)?;
        validate_layout(self.sample_rate, self.channels)
    }
}

/// Recording format. The target (file or callback) and the optional
/// activity detector are attached to the recorder itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub sample_rate: u32,
    pub channels: usize,
    pub sample_format: SampleFormat,
    pub encoding_format: EncodingFormat,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            sample_format: SampleFormat::S16,
            encoding_format: EncodingFormat::Wav,
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> Result<()> {
        validate_layout(self.sample_rate, self.channels)
    }
}

/// Fastest accepted playback speed multiplier
pub const MAX_SPEED: f64 = 32.0;

pub(crate) fn validate_speed(speed: f64) -> Result<()> {
    if speed.is_finite() && speed > 0.0 && speed <= MAX_SPEED {
        Ok(())
    } else {
        Err(AudioError::InvalidArgument(format!(
            "playback speed must be in (0, {MAX_SPEED}] (got {speed})"
        )))
    }
}

fn validate_layout(sample_rate: u32, channels: usize) -> Result<()> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidArgument("sample rate must be non-zero".into()));
    }
    if channels == 0 {
        return Err(AudioError::InvalidArgument("channel count must be non-zero".into()));
    }
    Ok(())
}
