//! High-level spectrum analyzer
//!
//! Combines the FFT engine with windowing for magnitude spectra of real
//! signals. Buffers are allocated once per configuration.

use super::fft::FftEngine;
use super::windowing::window_correction_factor;
use super::windows::{generate_window, WindowShape};
use crate::error::Result;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Spectrum analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// FFT size (number of samples, must be a power of 2)
    pub fft_size: usize,

    /// Window applied before the transform
    pub window: WindowShape,

    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Apply amplitude correction for windowing
    pub apply_correction: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            window: WindowShape::Hamming,
            sample_rate: 48000.0,
            apply_correction: true,
        }
    }
}

/// Magnitude spectrum analyzer for real-valued signals
pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    engine: FftEngine,
    window: Vec<f32>,
    buffer: Vec<Complex64>,
    correction_factor: f64,
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let engine = FftEngine::new(config.fft_size)?;
        let window = generate_window(config.window, config.fft_size)?;
        let correction_factor = if config.apply_correction {
            window_correction_factor(config.window, config.fft_size)?
        } else {
            1.0
        };

        Ok(Self {
            buffer: vec![Complex64::new(0.0, 0.0); config.fft_size],
            config,
            engine,
            window,
            correction_factor,
        })
    }

    /// Analyze signal and return magnitude spectrum
    ///
    /// The signal is truncated or zero-padded to the FFT size, windowed and
    /// transformed. Returns |X[k]| for k = 0..=fft_size/2.
    pub fn analyze(&mut self, signal: &[f64]) -> Result<Vec<f64>> {
        let copy_len = signal.len().min(self.config.fft_size);
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < copy_len { signal[i] } else { 0.0 };
            *slot = Complex64::new(sample * self.window[i] as f64, 0.0);
        }

        self.engine.forward(&mut self.buffer)?;

        Ok(self.buffer[..self.num_bins()]
            .iter()
            .map(|c| c.norm() * self.correction_factor)
            .collect())
    }

    /// Analyze and return magnitude in dB: 20·log10(|X[k]| / reference)
    pub fn analyze_db(&mut self, signal: &[f64], reference: f64) -> Result<Vec<f64>> {
        Ok(self
            .analyze(signal)?
            .into_iter()
            .map(|mag| 20.0 * (mag.max(1e-10) / reference).log10())
            .collect())
    }

    /// Center frequency of each bin in Hz
    pub fn frequency_bins_hz(&self) -> Vec<f64> {
        let bin_width = self.config.sample_rate / self.config.fft_size as f64;
        (0..self.num_bins()).map(|bin| bin as f64 * bin_width).collect()
    }

    /// Replace the configuration, re-planning only what changed
    pub fn update_config(&mut self, config: AnalyzerConfig) -> Result<()> {
        if config.fft_size != self.config.fft_size {
            self.engine = FftEngine::new(config.fft_size)?;
            self.buffer = vec![Complex64::new(0.0, 0.0); config.fft_size];
        }
        if config.fft_size != self.config.fft_size || config.window != self.config.window {
            self.window = generate_window(config.window, config.fft_size)?;
        }
        self.correction_factor = if config.apply_correction {
            window_correction_factor(config.window, config.fft_size)?
        } else {
            1.0
        };
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Number of bins (fft_size/2 + 1)
    pub fn num_bins(&self) -> usize {
        self.config.fft_size / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_analyzer_finds_sine_peak() {
        let config = AnalyzerConfig {
            fft_size: 1024,
            window: WindowShape::Hanning,
            sample_rate: 48000.0,
            apply_correction: true,
        };
        let mut analyzer = SpectrumAnalyzer::new(config).unwrap();

        let freq_hz = 1500.0;
        let signal: Vec<f64> = (0..1024)
            .map(|n| (2.0 * PI * freq_hz * n as f64 / 48000.0).sin())
            .collect();

        let spectrum = analyzer.analyze(&signal).unwrap();
        assert_eq!(spectrum.len(), 513);

        let freqs = analyzer.frequency_bins_hz();
        let (peak_idx, &peak) = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .unwrap();

        assert!((freqs[peak_idx] - freq_hz).abs() < 100.0);
        // Corrected amplitude of a unit sine is ~N/2
        assert!(peak > 400.0 && peak < 600.0);
    }

    #[test]
    fn test_analyzer_db() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default()).unwrap();
        let spectrum_db = analyzer.analyze_db(&vec![1.0; 1024], 1.0).unwrap();
        assert!(spectrum_db[0] > 50.0);
    }

    #[test]
    fn test_update_config_resizes() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default()).unwrap();
        analyzer
            .update_config(AnalyzerConfig {
                fft_size: 512,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(analyzer.num_bins(), 257);
        assert_eq!(analyzer.analyze(&[0.5; 300]).unwrap().len(), 257);
    }

    #[test]
    fn test_rejects_non_power_of_two_size() {
        let config = AnalyzerConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(SpectrumAnalyzer::new(config).is_err());
    }
}
