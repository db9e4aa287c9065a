//! Variable-speed playback with linear interpolation
//!
//! `SoundPlayer::generate_output` is called from the device callback and
//! always fills the whole buffer, with audio or silence. Frames read past the
//! interpolation point are carried into the next call, so the source is read
//! strictly sequentially and never re-positioned on the steady-state path.
//!
//! The source is stepped by `speed × source rate / output rate` frames per
//! output frame, so material at another sample rate plays at its natural
//! pitch.

use super::pool::BufferPool;
use super::source::SampleSource;
use crate::config::{validate_speed, PlaybackConfig, PlaybackState};
use crate::error::{AudioError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra source frames read beyond `ceil(frames × step)` so the last
/// output frame always has a ceiling neighbour to interpolate towards
const GUARD_FRAMES: usize = 2;

/// Carry-over space reserved up front, in frames
const CARRY_RESERVE_FRAMES: usize = 8;

pub type PlaybackEndedCallback = Box<dyn FnMut() + Send>;

/// Player shared between the control thread and the device callback
pub type SharedPlayer = Arc<Mutex<SoundPlayer>>;

pub struct SoundPlayer {
    source: Box<dyn SampleSource>,
    config: PlaybackConfig,
    pool: Arc<BufferPool>,
    state: PlaybackState,

    /// Source frames consumed by interpolation
    cursor: u64,

    /// Fractional position between `cursor` and `cursor + 1`, in [0, 1)
    phase: f64,

    /// Interleaved frames already read from the source but not consumed
    carry: Vec<f32>,

    on_ended: Option<PlaybackEndedCallback>,
    ended_count: u64,
    read_errors: u64,
}

impl SoundPlayer {
    pub fn new(source: impl SampleSource + 'static, config: PlaybackConfig, pool: Arc<BufferPool>) -> Result<Self> {
        config.validate()?;
        if source.channels() != config.channels {
            return Err(AudioError::InvalidArgument(format!(
                "source has {} channels, output expects {}",
                source.channels(),
                config.channels
            )));
        }
        if source.sample_rate() == 0 {
            return Err(AudioError::InvalidArgument("source sample rate must be non-zero".into()));
        }
        let carry = Vec::with_capacity(CARRY_RESERVE_FRAMES * config.channels);
        Ok(Self {
            source: Box::new(source),
            config,
            pool,
            state: PlaybackState::Stopped,
            cursor: 0,
            phase: 0.0,
            carry,
            on_ended: None,
            ended_count: 0,
            read_errors: 0,
        })
    }

    /// Player drawing scratch space from the process-wide pool
    pub fn with_shared_pool(source: impl SampleSource + 'static, config: PlaybackConfig) -> Result<Self> {
        Self::new(source, config, BufferPool::shared())
    }

    pub fn into_shared(self) -> SharedPlayer {
        Arc::new(Mutex::new(self))
    }

    /// Start or resume. From `Stopped` playback restarts at frame 0.
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => return,
            PlaybackState::Paused => {}
            PlaybackState::Stopped => {
                if self.cursor != 0 || !self.carry.is_empty() {
                    if let Err(e) = self.seek_to_frame(0) {
                        warn!("Cannot rewind before playing: {}", e);
                    }
                }
            }
        }
        self.state = PlaybackState::Playing;
        debug!(cursor = self.cursor, "playback started");
    }

    /// Halt output, keeping the position
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            debug!(cursor = self.cursor, "playback paused");
        }
    }

    /// Halt output and rewind to frame 0
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        if self.source.can_seek() {
            if let Err(e) = self.seek_to_frame(0) {
                warn!("Failed to rewind on stop: {}", e);
            }
        }
        debug!("playback stopped");
    }

    /// Fill `output` (interleaved, `config.channels` wide).
    ///
    /// Does nothing unless playing. Otherwise every sample of `output` is
    /// written: interpolated audio up to the end of the source, then either
    /// the looped start of the source or silence.
    pub fn generate_output(&mut self, output: &mut [f32]) {
        if self.state != PlaybackState::Playing {
            return;
        }

        let channels = self.config.channels;
        let total_frames = output.len() / channels;
        // Bounded by the whole source so renders after a loop wrap still fit
        let needed = self.required_frames(total_frames, self.source.length());
        let scratch_len = needed.max(self.carry.len() / channels) * channels;
        let mut scratch = self.pool.acquire(scratch_len);

        let mut written = 0;
        let mut just_wrapped = false;
        while written < total_frames {
            let produced = self.render(&mut output[written * channels..total_frames * channels], &mut scratch);
            written += produced;
            if written == total_frames {
                break;
            }
            if produced > 0 {
                just_wrapped = false;
            }

            // Source ran dry with part of the buffer left
            if self.config.looping && !just_wrapped && self.rewind() {
                just_wrapped = true;
                continue;
            }
            self.end_of_stream(&mut output[written * channels..total_frames * channels]);
            break;
        }

        output[total_frames * channels..].fill(0.0);
    }

    /// Interpolate as many frames of `output` as the source allows.
    /// Returns the number of frames written.
    fn render(&mut self, output: &mut [f32], scratch: &mut [f32]) -> usize {
        let channels = self.config.channels;
        let step = self.step();
        let out_frames = output.len() / channels;
        if out_frames == 0 {
            return 0;
        }

        let remaining = self.source.length().saturating_sub(self.cursor);
        let needed = self.required_frames(out_frames, remaining);
        let carried = self.carry.len() / channels;
        scratch[..self.carry.len()].copy_from_slice(&self.carry);
        self.carry.clear();

        let mut available = carried;
        if needed > carried {
            match self.source.read(&mut scratch[carried * channels..needed * channels]) {
                Ok(frames) => available += frames.min(needed - carried),
                // Treated as end of stream; the callback must not unwind
                Err(_) => self.read_errors += 1,
            }
        }
        if available == 0 {
            return 0;
        }

        let frames = &scratch[..available * channels];
        let mut produced = 0;
        for (i, out_frame) in output.chunks_exact_mut(channels).enumerate() {
            let position = self.phase + step * i as f64;
            let index = position.floor() as usize;
            if index >= available {
                break;
            }
            let frac = (position - index as f64) as f32;
            let current = &frames[index * channels..(index + 1) * channels];

            if index + 1 < available {
                let next = &frames[(index + 1) * channels..(index + 2) * channels];
                for ((out, &a), &b) in out_frame.iter_mut().zip(current).zip(next) {
                    *out = a + (b - a) * frac;
                }
            } else if frac == 0.0 {
                out_frame.copy_from_slice(current);
            } else {
                // Ceiling frame was never read
                break;
            }
            produced += 1;
        }

        let advance = self.phase + step * produced as f64;
        let whole = advance.floor() as usize;
        let consumed = if whole <= available {
            self.phase = advance - whole as f64;
            whole
        } else {
            self.phase = 0.0;
            available
        };

        self.carry.extend_from_slice(&frames[consumed * channels..]);
        self.cursor += consumed as u64;
        produced
    }

    /// Source frames advanced per output frame
    fn step(&self) -> f64 {
        self.config.speed * self.source.sample_rate() as f64 / self.config.sample_rate as f64
    }

    /// Source frames to have on hand for `output_frames`, at most `limit`
    fn required_frames(&self, output_frames: usize, limit: u64) -> usize {
        // Float to int casts saturate
        let wanted = (output_frames as f64 * self.step()).ceil() as usize;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        wanted.saturating_add(GUARD_FRAMES).min(limit)
    }

    /// Jump back to frame 0 for looping. False when the source can't rewind.
    fn rewind(&mut self) -> bool {
        if !self.source.can_seek() || self.source.seek(0).is_err() {
            return false;
        }
        self.cursor = 0;
        self.phase = 0.0;
        self.carry.clear();
        true
    }

    fn end_of_stream(&mut self, tail: &mut [f32]) {
        tail.fill(0.0);
        self.state = PlaybackState::Stopped;
        self.ended_count += 1;
        if let Some(callback) = self.on_ended.as_mut() {
            callback();
        }
    }

    /// Reposition to an absolute source frame
    pub fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        if !self.source.can_seek() {
            return Err(AudioError::InvalidOperation("sample source is not seekable".into()));
        }
        self.source.seek(frame)?;
        self.cursor = frame;
        self.phase = 0.0;
        self.carry.clear();
        debug!(frame, "seeked");
        Ok(())
    }

    /// Reposition to a time on the speed-scaled timeline (see [`SoundPlayer::time`])
    pub fn seek_to_time(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(AudioError::InvalidArgument(format!(
                "seek time must be non-negative (got {seconds})"
            )));
        }
        let length = self.source.length();
        let duration = self.duration();
        let frame = if duration > 0.0 {
            ((seconds / duration * length as f64) as u64).min(length)
        } else {
            0
        };
        self.seek_to_frame(frame)
    }

    /// Elapsed wall-clock seconds at the current speed
    pub fn time(&self) -> f64 {
        self.cursor as f64 / self.source.sample_rate() as f64 / self.config.speed
    }

    /// Total wall-clock seconds at the current speed; changes with the speed
    pub fn duration(&self) -> f64 {
        self.source.length() as f64 / self.source.sample_rate() as f64 / self.config.speed
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        validate_speed(speed)?;
        self.config.speed = speed;
        Ok(())
    }

    pub fn speed(&self) -> f64 {
        self.config.speed
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.config.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.config.looping
    }

    /// Called on the audio thread each time a non-looping source runs out
    pub fn set_on_playback_ended(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_ended = Some(Box::new(callback));
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Number of times playback reached the end of the source
    pub fn ended_count(&self) -> u64 {
        self.ended_count
    }

    /// Source read failures absorbed as silence
    pub fn read_errors(&self) -> u64 {
        self.read_errors
    }
}
