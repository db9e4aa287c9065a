//! Spectral transform engine: FFT/IFFT, windows and magnitude analysis

pub mod analysis;
pub mod fft;
pub mod simd;
pub mod windowing;
pub mod windows;

pub use analysis::{AnalyzerConfig, SpectrumAnalyzer};
pub use fft::{forward, inverse, inverse_normalized, FftEngine, FftTier};
pub use windowing::{apply_window, apply_window_inplace, window_correction_factor};
pub use windows::{generate_window, generate_window_with_tier, WindowShape};
