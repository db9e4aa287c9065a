//! Capture session subscribed to the delivery feed
//!
//! The recorder forwards delivered buffers to an external callback or an
//! encoder, optionally gated by an activity detector. The real-time side
//! only ever uses `try_lock`; a buffer that arrives while the control thread
//! holds the lock is dropped and counted.

use super::activity::{ActivityEvent, SharedDetector};
use super::encoder::{Encoder, EncoderFactory};
use super::feed::{DeliveryFeed, SampleSubscriber, Subscription};
use crate::config::{Capability, PlaybackState, RecordingConfig};
use crate::error::{AudioError, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External consumer of captured buffers, called on the real-time thread
pub type ProcessCallback = Box<dyn FnMut(&[f32]) + Send>;

#[derive(Default)]
struct Sinks {
    encoder: Option<Box<dyn Encoder>>,
    callback: Option<ProcessCallback>,
    detector: Option<SharedDetector>,
}

/// State reachable from the delivery thread
struct CaptureShared {
    state: AtomicU8,

    /// Detector events drive the state while set
    auto_gate: AtomicBool,

    sinks: Mutex<Sinks>,

    contended_buffers: AtomicU64,
    encode_errors: AtomicU64,
}

impl CaptureShared {
    fn state(&self) -> PlaybackState {
        PlaybackState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn apply(&self, event: ActivityEvent) {
        match event {
            ActivityEvent::SpeechDetected => self.transition(PlaybackState::Paused, PlaybackState::Playing),
            ActivityEvent::SpeechAbsent => self.transition(PlaybackState::Playing, PlaybackState::Paused),
        };
    }
}

impl SampleSubscriber for CaptureShared {
    fn on_samples_delivered(&self, samples: &[f32], direction: Capability) {
        if !direction.carries_capture() {
            return;
        }
        let Some(mut sinks) = self.sinks.try_lock() else {
            self.contended_buffers.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // The detector needs the continuous signal, whatever the state
        if let Some(detector) = sinks.detector.as_ref() {
            match detector.try_lock() {
                Some(mut detector) => {
                    if let Some(event) = detector.process(samples) {
                        if self.auto_gate.load(Ordering::Acquire) {
                            self.apply(event);
                        }
                    }
                }
                None => {
                    self.contended_buffers.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if self.state() != PlaybackState::Playing {
            return;
        }
        if let Some(callback) = sinks.callback.as_mut() {
            callback(samples);
        }
        if let Some(encoder) = sinks.encoder.as_mut() {
            if encoder.encode(samples).is_err() {
                self.encode_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Capture session: Stopped (detached), Playing (capturing) or Paused
/// (attached but discarding)
pub struct Recorder {
    config: RecordingConfig,
    feed: Arc<DeliveryFeed>,
    factory: Arc<dyn EncoderFactory>,
    file_path: Option<PathBuf>,
    shared: Arc<CaptureShared>,
    subscription: Option<Subscription>,
    disposed: bool,
}

impl Recorder {
    pub fn new(feed: Arc<DeliveryFeed>, factory: Arc<dyn EncoderFactory>, config: RecordingConfig) -> Self {
        Self {
            config,
            feed,
            factory,
            file_path: None,
            shared: Arc::new(CaptureShared {
                state: AtomicU8::new(PlaybackState::Stopped as u8),
                auto_gate: AtomicBool::new(false),
                sinks: Mutex::new(Sinks::default()),
                contended_buffers: AtomicU64::new(0),
                encode_errors: AtomicU64::new(0),
            }),
            subscription: None,
            disposed: false,
        }
    }

    /// Record into a file. Mutually exclusive with [`Recorder::set_callback`].
    pub fn set_file_path(&mut self, path: impl Into<PathBuf>) {
        self.file_path = Some(path.into());
    }

    pub fn clear_file_path(&mut self) {
        self.file_path = None;
    }

    /// Hand captured buffers to `callback`. Mutually exclusive with a file path.
    pub fn set_callback(&mut self, callback: impl FnMut(&[f32]) + Send + 'static) {
        self.shared.sinks.lock().callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.shared.sinks.lock().callback = None;
    }

    /// Attach a detector; while recording, its events pause and resume capture
    pub fn set_activity_detector(&mut self, detector: SharedDetector) {
        self.shared.sinks.lock().detector = Some(detector);
        if self.subscription.is_some() {
            self.shared.auto_gate.store(true, Ordering::Release);
        }
    }

    pub fn clear_activity_detector(&mut self) {
        self.shared.auto_gate.store(false, Ordering::Release);
        self.shared.sinks.lock().detector = None;
    }

    /// Begin capturing. No-op while already capturing; resumes when paused.
    pub fn start(&mut self) -> Result<()> {
        if self.disposed {
            return Err(AudioError::InvalidOperation("recorder has been disposed".into()));
        }
        match self.state() {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Paused => {
                self.resume();
                return Ok(());
            }
            PlaybackState::Stopped => {}
        }

        let has_callback = self.shared.sinks.lock().callback.is_some();
        if self.file_path.is_some() == has_callback {
            return Err(AudioError::InvalidArgument(
                "exactly one of file path or processing callback must be set".into(),
            ));
        }
        self.config.validate()?;

        let encoder = match self.file_path.as_deref() {
            Some(path) => Some(self.create_encoder(path)?),
            None => None,
        };

        {
            let mut sinks = self.shared.sinks.lock();
            sinks.encoder = encoder;
            self.shared.auto_gate.store(sinks.detector.is_some(), Ordering::Release);
        }
        self.shared.set_state(PlaybackState::Playing);

        let subscriber: Arc<dyn SampleSubscriber> = self.shared.clone();
        self.subscription = Some(self.feed.subscribe(subscriber));

        info!(file = ?self.file_path, "recording started");
        Ok(())
    }

    fn create_encoder(&self, path: &Path) -> Result<Box<dyn Encoder>> {
        let channels = u16::try_from(self.config.channels)
            .map_err(|_| AudioError::InvalidArgument(format!("too many channels: {}", self.config.channels)))?;
        self.factory
            .create(
                path,
                self.config.encoding_format,
                self.config.sample_format,
                channels,
                self.config.sample_rate,
            )
            .map_err(|e| match e {
                AudioError::Backend(_) => e,
                other => AudioError::Backend(format!("encoder creation failed: {other}")),
            })
    }

    /// Discard delivered buffers without detaching. Only from `Playing`.
    pub fn pause(&self) {
        if self.shared.transition(PlaybackState::Playing, PlaybackState::Paused) {
            debug!("recording paused");
        }
    }

    /// Resume capturing. Only from `Paused`.
    pub fn resume(&self) {
        if self.shared.transition(PlaybackState::Paused, PlaybackState::Playing) {
            debug!("recording resumed");
        }
    }

    /// Detach from the feed, then finalize and drop the encoder.
    /// Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let subscription = self.subscription.take();
        let was_running = subscription.is_some();
        if let Some(subscription) = subscription {
            self.feed.unsubscribe(subscription);
        }
        self.shared.auto_gate.store(false, Ordering::Release);
        self.shared.set_state(PlaybackState::Stopped);

        // Waits out a delivery still holding the sinks
        let encoder = self.shared.sinks.lock().encoder.take();
        if was_running {
            info!("recording stopped");
        }
        match encoder {
            Some(mut encoder) => encoder.finish(),
            None => Ok(()),
        }
    }

    /// Stop and release every attached callback, detector and target
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let result = self.stop();
        *self.shared.sinks.lock() = Sinks::default();
        self.file_path = None;
        self.disposed = true;
        debug!("recorder disposed");
        result
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Buffers skipped because a lock was held elsewhere
    pub fn contended_buffers(&self) -> u64 {
        self.shared.contended_buffers.load(Ordering::Relaxed)
    }

    pub fn encode_errors(&self) -> u64 {
        self.shared.encode_errors.load(Ordering::Relaxed)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("Error while disposing recorder: {}", e);
        }
    }
}
