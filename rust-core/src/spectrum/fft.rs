//! Radix-2 FFT engine with runtime-selected SIMD tiers
//!
//! Three implementations share one set of precomputed twiddle tables:
//! wide-lane (AVX, two butterflies per op), narrow-lane (SSE2, one butterfly
//! per op) and a recursive scalar fallback. The tier is picked per engine
//! from the running CPU, so results stay comparable across machines.

use super::simd;
use crate::error::{ensure_power_of_two, AudioError, Result};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Implementation tier of the transform and window kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftTier {
    /// 256-bit vectors, two complex values per register
    Wide,
    /// 128-bit vectors, one complex value per register
    Narrow,
    /// Portable divide-and-conquer recursion
    Scalar,
}

impl FftTier {
    pub const ALL: [FftTier; 3] = [FftTier::Wide, FftTier::Narrow, FftTier::Scalar];

    /// Whether the running CPU can execute this tier
    pub fn is_available(&self) -> bool {
        match self {
            FftTier::Wide => simd::avx_available(),
            FftTier::Narrow => simd::sse2_available(),
            FftTier::Scalar => true,
        }
    }

    /// Smallest length this tier's lane width can handle
    pub fn min_len(&self) -> usize {
        match self {
            FftTier::Wide => 4,
            FftTier::Narrow => 2,
            FftTier::Scalar => 1,
        }
    }

    pub fn supports(&self, n: usize) -> bool {
        self.is_available() && n >= self.min_len()
    }

    /// Widest available tier whose vector width fits `n`
    pub fn detect(n: usize) -> Self {
        Self::ALL
            .into_iter()
            .find(|tier| tier.supports(n))
            .unwrap_or(FftTier::Scalar)
    }

    pub(crate) fn check(&self, n: usize) -> Result<()> {
        if self.supports(n) {
            Ok(())
        } else {
            Err(AudioError::InvalidArgument(format!(
                "{self:?} tier cannot process length {n} on this CPU"
            )))
        }
    }
}

/// In-place complex FFT of a fixed power-of-two size
pub struct FftEngine {
    size: usize,
    tier: FftTier,

    /// `bit_reverse[i]` is the destination of element `i` before the stages
    bit_reverse: Vec<usize>,

    /// Per-stage twiddles, stage with `half` butterflies stored at
    /// `[half - 1, 2 * half - 1)`: `exp(-iπk / half)`
    twiddles: Vec<Complex64>,

    /// Partition buffer for the scalar recursion
    scratch: Vec<Complex64>,
}

impl FftEngine {
    /// Create an engine using the widest tier the CPU supports
    pub fn new(size: usize) -> Result<Self> {
        ensure_power_of_two(size, "FFT")?;
        Self::build(size, FftTier::detect(size))
    }

    /// Create an engine pinned to a specific tier
    pub fn with_tier(size: usize, tier: FftTier) -> Result<Self> {
        ensure_power_of_two(size, "FFT")?;
        tier.check(size)?;
        Self::build(size, tier)
    }

    fn build(size: usize, tier: FftTier) -> Result<Self> {
        let bits = size.trailing_zeros();
        let bit_reverse = (0..size)
            .map(|i| if bits == 0 { 0 } else { i.reverse_bits() >> (usize::BITS - bits) })
            .collect();

        let mut twiddles = Vec::with_capacity(size.saturating_sub(1));
        let mut half = 1;
        while half < size {
            twiddles.extend(
                (0..half).map(|k| Complex64::from_polar(1.0, -PI * k as f64 / half as f64)),
            );
            half *= 2;
        }

        let scratch = match tier {
            FftTier::Scalar => vec![Complex64::new(0.0, 0.0); size],
            _ => Vec::new(),
        };

        Ok(Self {
            size,
            tier,
            bit_reverse,
            twiddles,
            scratch,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tier(&self) -> FftTier {
        self.tier
    }

    /// Forward transform, in place
    pub fn forward(&mut self, data: &mut [Complex64]) -> Result<()> {
        self.check_len(data)?;

        match self.tier {
            #[cfg(target_arch = "x86_64")]
            FftTier::Wide => {
                self.permute(data);
                // SAFETY: the tier was validated against AVX support at construction
                // and the twiddle table matches `data.len()`.
                unsafe { simd::fft_wide(data, &self.twiddles) }
            }
            #[cfg(target_arch = "x86_64")]
            FftTier::Narrow => {
                self.permute(data);
                // SAFETY: as above, for SSE2.
                unsafe { simd::fft_narrow(data, &self.twiddles) }
            }
            _ => scalar_fft(data, &mut self.scratch, &self.twiddles),
        }
        Ok(())
    }

    /// Inverse transform via conjugate → forward → conjugate.
    ///
    /// The result is NOT divided by N: every output element is N times the
    /// original sample. Use [`FftEngine::inverse_normalized`] for a true
    /// inverse.
    pub fn inverse(&mut self, data: &mut [Complex64]) -> Result<()> {
        self.check_len(data)?;
        conjugate(data);
        self.forward(data)?;
        conjugate(data);
        Ok(())
    }

    /// Inverse transform followed by the 1/N rescale
    pub fn inverse_normalized(&mut self, data: &mut [Complex64]) -> Result<()> {
        self.inverse(data)?;
        let scale = 1.0 / self.size as f64;
        for value in data.iter_mut() {
            *value *= scale;
        }
        Ok(())
    }

    fn check_len(&self, data: &[Complex64]) -> Result<()> {
        if data.len() == self.size {
            Ok(())
        } else {
            Err(AudioError::InvalidArgument(format!(
                "engine planned for {} points, got {}",
                self.size,
                data.len()
            )))
        }
    }

    #[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
    fn permute(&self, data: &mut [Complex64]) {
        for (i, &j) in self.bit_reverse.iter().enumerate() {
            if j > i {
                data.swap(i, j);
            }
        }
    }
}

/// Forward transform with a one-off engine
pub fn forward(data: &mut [Complex64]) -> Result<()> {
    FftEngine::new(data.len())?.forward(data)
}

/// Unscaled inverse transform with a one-off engine (see [`FftEngine::inverse`])
pub fn inverse(data: &mut [Complex64]) -> Result<()> {
    FftEngine::new(data.len())?.inverse(data)
}

/// True inverse transform with a one-off engine
pub fn inverse_normalized(data: &mut [Complex64]) -> Result<()> {
    FftEngine::new(data.len())?.inverse_normalized(data)
}

fn conjugate(data: &mut [Complex64]) {
    for value in data.iter_mut() {
        value.im = -value.im;
    }
}

/// Recursive decimation in time. `scratch` holds at least `data.len()` values.
fn scalar_fft(data: &mut [Complex64], scratch: &mut [Complex64], twiddles: &[Complex64]) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    let half = n / 2;

    for i in 0..half {
        scratch[i] = data[2 * i];
        scratch[half + i] = data[2 * i + 1];
    }

    let (even, odd) = scratch[..n].split_at_mut(half);
    {
        // data is free to act as scratch for the halves now
        let (even_scratch, odd_scratch) = data.split_at_mut(half);
        scalar_fft(even, even_scratch, twiddles);
        scalar_fft(odd, odd_scratch, twiddles);
    }

    let stage = &twiddles[half - 1..n - 1];
    for k in 0..half {
        let t = stage[k] * odd[k];
        data[k] = even[k] + t;
        data[k + half] = even[k] - t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_signal(n: usize) -> Vec<Complex64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                Complex64::new((0.37 * t).sin() + 0.25 * (1.3 * t).cos(), (0.11 * t).cos() - 0.5)
            })
            .collect()
    }

    fn reference_fft(input: &[Complex64]) -> Vec<Complex64> {
        let mut planner = rustfft::FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(input.len());
        let mut buffer = input.to_vec();
        fft.process(&mut buffer);
        buffer
    }

    fn available_tiers(n: usize) -> Vec<FftTier> {
        FftTier::ALL.into_iter().filter(|t| t.supports(n)).collect()
    }

    #[test]
    fn test_all_tiers_match_reference() {
        for bits in 0..=12 {
            let n = 1usize << bits;
            let signal = test_signal(n);
            let expected = reference_fft(&signal);

            for tier in available_tiers(n) {
                let mut engine = FftEngine::with_tier(n, tier).unwrap();
                let mut data = signal.clone();
                engine.forward(&mut data).unwrap();

                let tolerance = 1e-9 * n as f64;
                for (got, want) in data.iter().zip(expected.iter()) {
                    assert_abs_diff_eq!(got.re, want.re, epsilon = tolerance);
                    assert_abs_diff_eq!(got.im, want.im, epsilon = tolerance);
                }
            }
        }
    }

    #[test]
    fn test_round_trip_with_explicit_rescale() {
        for bits in 0..=11 {
            let n = 1usize << bits;
            let signal = test_signal(n);

            for tier in available_tiers(n) {
                let mut engine = FftEngine::with_tier(n, tier).unwrap();
                let mut data = signal.clone();
                engine.forward(&mut data).unwrap();
                engine.inverse(&mut data).unwrap();

                for (got, want) in data.iter().zip(signal.iter()) {
                    assert_abs_diff_eq!(got.re / n as f64, want.re, epsilon = 1e-10);
                    assert_abs_diff_eq!(got.im / n as f64, want.im, epsilon = 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_inverse_is_unscaled() {
        // A constant spectrum inverts to an impulse of height N, not 1
        let n = 64;
        let mut data = vec![Complex64::new(1.0, 0.0); n];
        inverse(&mut data).unwrap();

        assert_abs_diff_eq!(data[0].re, n as f64, epsilon = 1e-9);
        for value in &data[1..] {
            assert_abs_diff_eq!(value.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_inverse_normalized_restores_signal() {
        let signal = test_signal(256);
        let mut data = signal.clone();
        forward(&mut data).unwrap();
        inverse_normalized(&mut data).unwrap();

        for (got, want) in data.iter().zip(signal.iter()) {
            assert_abs_diff_eq!(got.re, want.re, epsilon = 1e-10);
            assert_abs_diff_eq!(got.im, want.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_impulse_gives_flat_spectrum() {
        let mut data = vec![Complex64::new(0.0, 0.0); 32];
        data[0] = Complex64::new(1.0, 0.0);
        forward(&mut data).unwrap();

        for value in &data {
            assert_abs_diff_eq!(value.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(value.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_non_power_of_two_rejected() {
        for n in [0, 3, 6, 100, 1000] {
            assert!(matches!(FftEngine::new(n), Err(AudioError::InvalidArgument(_))));
        }
        let mut data = vec![Complex64::new(0.0, 0.0); 12];
        assert!(matches!(forward(&mut data), Err(AudioError::InvalidArgument(_))));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut engine = FftEngine::new(16).unwrap();
        let mut data = vec![Complex64::new(0.0, 0.0); 8];
        assert!(matches!(engine.forward(&mut data), Err(AudioError::InvalidArgument(_))));
    }

    #[test]
    fn test_tier_detection_respects_length() {
        assert_eq!(FftTier::detect(1), FftTier::Scalar);
        assert!(FftTier::detect(2) != FftTier::Wide);
        assert!(FftTier::Scalar.supports(1));
        assert!(!FftTier::Wide.supports(2));
        assert!(FftEngine::with_tier(2, FftTier::Wide).is_err());
    }
}
