//! Applying windows to time-domain signals before the FFT

use super::windows::{generate_window, WindowShape};
use crate::error::Result;

/// Apply window to signal
///
/// # Arguments
/// * `signal` - Input signal (power-of-two length)
/// * `shape` - Window shape
///
/// # Returns
/// Windowed signal
pub fn apply_window(signal: &[f64], shape: WindowShape) -> Result<Vec<f64>> {
    let mut windowed = signal.to_vec();
    apply_window_inplace(&mut windowed, shape)?;
    Ok(windowed)
}

/// Apply window in-place
pub fn apply_window_inplace(signal: &mut [f64], shape: WindowShape) -> Result<()> {
    let window = generate_window(shape, signal.len())?;
    for (s, &w) in signal.iter_mut().zip(window.iter()) {
        *s *= w as f64;
    }
    Ok(())
}

/// Amplitude correction factor for a window
///
/// Windowing lowers the coherent gain; multiplying FFT magnitudes by this
/// factor restores the level of a windowed sinusoid.
pub fn window_correction_factor(shape: WindowShape, length: usize) -> Result<f64> {
    let window = generate_window(shape, length)?;
    let sum: f64 = window.iter().map(|&w| w as f64).sum();
    Ok(length as f64 / sum)
}
