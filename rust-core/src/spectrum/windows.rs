//! Window coefficient generation
//!
//! Both shapes are raised cosines `a0 − a1·cos(2πi/(N−1))`, generated by the
//! same tiers as the FFT. The vectorized tiers use a range-reduced polynomial
//! cosine, so every tier agrees with the scalar `f64::cos` reference to
//! within 1e-6.

use super::fft::FftTier;
#[cfg(target_arch = "x86_64")]
use super::simd;
use crate::error::{ensure_power_of_two, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Window function shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowShape {
    /// w[i] = 0.54 − 0.46·cos(2πi/(N−1)), sidelobes ~ −43 dB
    Hamming,

    /// w[i] = 0.5·(1 − cos(2πi/(N−1))), sidelobes ~ −31 dB
    Hanning,
}

impl WindowShape {
    /// (a0, a1) of `a0 − a1·cos(θ)`
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            WindowShape::Hamming => (0.54, 0.46),
            WindowShape::Hanning => (0.5, 0.5),
        }
    }
}

/// Generate `length` coefficients with the widest tier the CPU supports
pub fn generate_window(shape: WindowShape, length: usize) -> Result<Vec<f32>> {
    ensure_power_of_two(length, "window")?;
    generate_window_with_tier(shape, length, FftTier::detect(length))
}

/// Generate `length` coefficients with a specific tier
pub fn generate_window_with_tier(shape: WindowShape, length: usize, tier: FftTier) -> Result<Vec<f32>> {
    ensure_power_of_two(length, "window")?;
    tier.check(length)?;

    if length == 1 {
        return Ok(vec![1.0]);
    }

    let (a0, a1) = shape.coefficients();
    let step = TAU / (length - 1) as f64;
    let mut window = vec![0.0f32; length];

    match tier {
        #[cfg(target_arch = "x86_64")]
        FftTier::Wide => {
            // SAFETY: AVX checked by `tier.check`, length is a power of two >= 4
            unsafe { simd::cosine_window_wide(&mut window, a0, a1, step) }
        }
        #[cfg(target_arch = "x86_64")]
        FftTier::Narrow => {
            // SAFETY: SSE2 checked by `tier.check`, length is a power of two >= 2
            unsafe { simd::cosine_window_narrow(&mut window, a0, a1, step) }
        }
        _ => {
            for (i, w) in window.iter_mut().enumerate() {
                let value = a0 - a1 * (step * i as f64).cos();
                *w = value.clamp(0.0, 1.0) as f32;
            }
        }
    }

    Ok(window)
}
