//! Device streams using cpal
//!
//! Capture publishes every input callback buffer to the delivery feed;
//! playback pulls from a shared player and publishes what it rendered.

use super::feed::DeliveryFeed;
use super::player::SharedPlayer;
use crate::config::Capability;
use crate::error::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};
use std::sync::Arc;
use tracing::{error, info};

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Input stream feeding a [`DeliveryFeed`]
pub struct CaptureStream {
    stream: Stream,
    device_info: AudioDeviceInfo,
}

impl CaptureStream {
    /// Open the default input device
    pub fn open_default(feed: Arc<DeliveryFeed>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDevice)?;

        Self::open(device, feed)
    }

    /// Open a specific input device with its default configuration
    pub fn open(device: Device, feed: Arc<DeliveryFeed>) -> Result<Self> {
        let name = device.name().map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DefaultConfig(e.to_string()))?;

        let device_info = AudioDeviceInfo {
            name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        let stream_config: StreamConfig = config.into();

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    feed.deliver(data, Capability::Recording);
                },
                move |err| {
                    error!("Audio input error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))?;

        info!(device = %device_info.name, sample_rate = device_info.sample_rate, "capture stream opened");
        Ok(Self { stream, device_info })
    }

    /// Start capturing audio
    pub fn start(&self) -> Result<()> {
        self.stream.play().map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Pause audio capture
    pub fn pause(&self) -> Result<()> {
        self.stream.pause().map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }
}

/// Output stream rendering a [`SharedPlayer`]
pub struct PlaybackStream {
    stream: Stream,
    device_info: AudioDeviceInfo,
}

impl PlaybackStream {
    /// Open the default output device at the player's rate and channel count
    pub fn open_default(player: SharedPlayer, feed: Arc<DeliveryFeed>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        Self::open(device, player, feed)
    }

    pub fn open(device: Device, player: SharedPlayer, feed: Arc<DeliveryFeed>) -> Result<Self> {
        let name = device.name().map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let (sample_rate, channels) = {
            let player = player.lock();
            let config = player.config();
            let channels = u16::try_from(config.channels)
                .map_err(|_| AudioError::InvalidArgument(format!("too many channels: {}", config.channels)))?;
            (config.sample_rate, channels)
        };

        let device_info = AudioDeviceInfo {
            name,
            sample_rate,
            channels,
        };
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    data.fill(0.0);
                    // Contended: this period stays silent
                    if let Some(mut player) = player.try_lock() {
                        player.generate_output(data);
                    }
                    feed.deliver(data, Capability::Playback);
                },
                move |err| {
                    error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))?;

        info!(device = %device_info.name, sample_rate, channels, "playback stream opened");
        Ok(Self { stream, device_info })
    }

    /// Start playing audio
    pub fn start(&self) -> Result<()> {
        self.stream.play().map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Pause audio playback
    pub fn pause(&self) -> Result<()> {
        self.stream.pause().map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }
}

/// List available audio input devices
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceName(e.to_string()))?;

    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok()?;
            Some(AudioDeviceInfo {
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            })
        })
        .collect())
}

/// List available audio output devices
pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceName(e.to_string()))?;

    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_output_config().ok()?;
            Some(AudioDeviceInfo {
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            })
        })
        .collect())
}
