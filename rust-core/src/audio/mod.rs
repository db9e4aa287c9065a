//! Real-time playback and capture pipelines

pub mod activity;
pub mod buffer;
pub mod device;
pub mod encoder;
pub mod feed;
pub mod player;
pub mod pool;
pub mod recorder;
pub mod source;

pub use activity::{ActivityDetector, ActivityEvent, EnergyDetector, EnergyDetectorConfig, SharedDetector};
pub use buffer::AudioRingBuffer;
pub use device::{AudioDeviceInfo, CaptureStream, PlaybackStream};
pub use encoder::{Encoder, EncoderFactory, WavEncoder, WavEncoderFactory};
pub use feed::{DeliveryFeed, SampleSubscriber, Subscription};
pub use player::{SharedPlayer, SoundPlayer};
pub use pool::{BufferPool, PooledBuffer};
pub use recorder::Recorder;
pub use source::{MemorySource, SampleSource};
