//! Voice activity detection driving the recorder's automatic gating
//!
//! The energy detector tracks a sliding RMS level and reports edges:
//! speech is detected when the level reaches the threshold and declared
//! absent once it has stayed below `threshold − hysteresis` for the
//! hangover time.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Edge reported by an activity detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    SpeechDetected,
    SpeechAbsent,
}

/// Consumes the raw capture signal and reports activity changes.
///
/// Runs inline on the real-time thread: must not block or allocate.
pub trait ActivityDetector: Send {
    /// Feed one buffer; returns an event when the activity state changed
    fn process(&mut self, samples: &[f32]) -> Option<ActivityEvent>;

    fn reset(&mut self) {}
}

/// Detector handle shared between the owner and a recorder
pub type SharedDetector = Arc<Mutex<dyn ActivityDetector>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyDetectorConfig {
    /// Level in dBFS at which speech is detected (e.g., -40.0)
    pub threshold_db: f64,

    /// How far below the threshold the level must fall to count as silence
    pub hysteresis_db: f64,

    /// RMS window length in milliseconds
    pub window_ms: f64,

    /// Silence must last this long before speech is declared absent
    pub hangover_ms: f64,

    pub sample_rate: f64,
}

impl Default for EnergyDetectorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            hysteresis_db: 3.0,
            window_ms: 50.0,
            hangover_ms: 300.0,
            sample_rate: 48000.0,
        }
    }
}

/// RMS energy detector with hysteresis and hangover
pub struct EnergyDetector {
    config: EnergyDetectorConfig,

    /// Circular buffer for RMS calculation
    rms_buffer: Vec<f64>,

    /// Current position in RMS buffer
    rms_cursor: usize,

    /// Sum of squares for efficient RMS calculation
    sum_of_squares: f64,

    /// Samples spent below the release level while active
    quiet_samples: usize,

    hangover_samples: usize,

    active: bool,
}

impl EnergyDetector {
    pub fn new(config: EnergyDetectorConfig) -> Self {
        let window = ((config.window_ms / 1000.0) * config.sample_rate).max(1.0) as usize;
        let hangover_samples = ((config.hangover_ms / 1000.0) * config.sample_rate).max(0.0) as usize;
        Self {
            config,
            rms_buffer: vec![0.0; window],
            rms_cursor: 0,
            sum_of_squares: 0.0,
            quiet_samples: 0,
            hangover_samples,
            active: false,
        }
    }

    /// Wrap in the handle type a recorder accepts
    pub fn into_shared(self) -> SharedDetector {
        Arc::new(Mutex::new(self))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current RMS level in dBFS
    pub fn level_db(&self) -> f64 {
        let rms = (self.sum_of_squares.max(0.0) / self.rms_buffer.len() as f64).sqrt();
        20.0 * (rms + 1e-10).log10()
    }

    #[inline]
    fn process_sample(&mut self, input: f64) {
        let old_sample = self.rms_buffer[self.rms_cursor];
        self.rms_buffer[self.rms_cursor] = input;
        self.sum_of_squares += input * input - old_sample * old_sample;
        self.rms_cursor = (self.rms_cursor + 1) % self.rms_buffer.len();

        let level_db = self.level_db();
        if self.active {
            if level_db < self.config.threshold_db - self.config.hysteresis_db {
                self.quiet_samples += 1;
                if self.quiet_samples > self.hangover_samples {
                    self.active = false;
                    self.quiet_samples = 0;
                }
            } else {
                self.quiet_samples = 0;
            }
        } else if level_db >= self.config.threshold_db {
            self.active = true;
            self.quiet_samples = 0;
        }
    }
}

impl ActivityDetector for EnergyDetector {
    fn process(&mut self, samples: &[f32]) -> Option<ActivityEvent> {
        let was_active = self.active;
        for &sample in samples {
            self.process_sample(sample as f64);
        }
        match (was_active, self.active) {
            (false, true) => Some(ActivityEvent::SpeechDetected),
            (true, false) => Some(ActivityEvent::SpeechAbsent),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.rms_buffer.fill(0.0);
        self.rms_cursor = 0;
        self.sum_of_squares = 0.0;
        self.quiet_samples = 0;
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> EnergyDetector {
        EnergyDetector::new(EnergyDetectorConfig {
            window_ms: 10.0,
            hangover_ms: 20.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_detects_speech_onset() {
        let mut detector = detector();
        assert_eq!(detector.process(&[0.0001; 960]), None);
        assert!(!detector.is_active());

        // ~ -20 dBFS
        assert_eq!(detector.process(&[0.1; 960]), Some(ActivityEvent::SpeechDetected));
        assert!(detector.is_active());
        assert_eq!(detector.process(&[0.1; 960]), None);
    }

    #[test]
    fn test_absence_waits_for_hangover() {
        let mut detector = detector();
        detector.process(&[0.1; 960]);

        // 10 ms of silence: window drains but hangover (20 ms) not yet over
        assert_eq!(detector.process(&[0.0; 480]), None);
        assert!(detector.is_active());

        assert_eq!(detector.process(&[0.0; 2400]), Some(ActivityEvent::SpeechAbsent));
        assert!(!detector.is_active());
    }

    #[test]
    fn test_hysteresis_holds_near_threshold() {
        let mut detector = detector();
        // ~ -40 dBFS opens
        detector.process(&[0.0101; 960]);
        assert!(detector.is_active());

        // ~ -42 dBFS is inside the 3 dB hysteresis band
        assert_eq!(detector.process(&[0.008; 4800]), None);
        assert!(detector.is_active());
    }

    #[test]
    fn test_reset() {
        let mut detector = detector();
        detector.process(&[0.5; 960]);
        detector.reset();
        assert!(!detector.is_active());
        assert!(detector.level_db() < -150.0);
    }
}
