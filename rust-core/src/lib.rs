//! Sonic Core - spectral transforms and real-time audio pipelines
//!
//! Radix-2 FFT with runtime-selected SIMD tiers, a variable-speed streaming
//! player and a gated capture session sharing one delivery feed.

pub mod audio;
pub mod config;
pub mod error;
pub mod spectrum;

pub use audio::{DeliveryFeed, Recorder, SoundPlayer};
pub use config::{Capability, PlaybackConfig, PlaybackState, RecordingConfig};
pub use error::{AudioError, Result};
pub use spectrum::{FftEngine, SpectrumAnalyzer, WindowShape};
