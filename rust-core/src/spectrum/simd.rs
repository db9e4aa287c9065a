//! SSE2 / AVX kernels for the vectorized transform and window tiers
//!
//! Everything here operates on `Complex64` slices reinterpreted as
//! interleaved `f64` pairs (`num_complex::Complex` is `#[repr(C)]`).
//! Callers must check `sse2_available()` / `avx_available()` before
//! entering the matching kernel.

#[cfg(target_arch = "x86_64")]
use num_complex::Complex64;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
#[cfg(target_arch = "x86_64")]
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Taylor coefficients of cos(y) in z = y², highest order first.
/// Valid after folding y into [0, π/2]; truncation error is below 1e-8.
#[cfg(target_arch = "x86_64")]
const COS_POLY: [f64; 7] = [
    1.0 / 479_001_600.0,
    -1.0 / 3_628_800.0,
    1.0 / 40_320.0,
    -1.0 / 720.0,
    1.0 / 24.0,
    -0.5,
    1.0,
];

pub fn sse2_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("sse2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

pub fn avx_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("avx")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Packed complex multiply of one complex value per register.
///
/// `a * b = (ar·br − ai·bi, ar·bi + ai·br)`: the real parts of `b` scale `a`
/// directly, the imaginary parts scale the lane-swapped `a`, and the first
/// cross term gets its sign flipped before the two halves are added.
#[cfg(target_arch = "x86_64")]
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn cmul_128(a: __m128d, b: __m128d) -> __m128d {
    let b_re = _mm_unpacklo_pd(b, b);
    let b_im = _mm_unpackhi_pd(b, b);
    let a_swapped = _mm_shuffle_pd(a, a, 0b01);
    let cross = _mm_xor_pd(_mm_mul_pd(a_swapped, b_im), _mm_set_pd(0.0, -0.0));
    _mm_add_pd(_mm_mul_pd(a, b_re), cross)
}

/// Same as `cmul_128` for two complex values per register
#[cfg(target_arch = "x86_64")]
#[inline]
#[target_feature(enable = "avx")]
unsafe fn cmul_256(a: __m256d, b: __m256d) -> __m256d {
    let b_re = _mm256_movedup_pd(b);
    let b_im = _mm256_permute_pd(b, 0b1111);
    let a_swapped = _mm256_permute_pd(a, 0b0101);
    let sign = _mm256_set_pd(0.0, -0.0, 0.0, -0.0);
    let cross = _mm256_xor_pd(_mm256_mul_pd(a_swapped, b_im), sign);
    _mm256_add_pd(_mm256_mul_pd(a, b_re), cross)
}

/// One radix-2 stage, one butterfly per register
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn stage_128(data: &mut [Complex64], stage_twiddles: &[Complex64], half: usize) {
    let n = data.len();
    let ptr = data.as_mut_ptr() as *mut f64;
    let tw = stage_twiddles.as_ptr() as *const f64;
    let mut start = 0;
    while start < n {
        for k in 0..half {
            let top = ptr.add(2 * (start + k));
            let bottom = ptr.add(2 * (start + k + half));
            let w = _mm_loadu_pd(tw.add(2 * k));
            let u = _mm_loadu_pd(top);
            let t = cmul_128(_mm_loadu_pd(bottom), w);
            _mm_storeu_pd(top, _mm_add_pd(u, t));
            _mm_storeu_pd(bottom, _mm_sub_pd(u, t));
        }
        start += 2 * half;
    }
}

/// One radix-2 stage, two adjacent butterflies per register. `half >= 2`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn stage_256(data: &mut [Complex64], stage_twiddles: &[Complex64], half: usize) {
    let n = data.len();
    let ptr = data.as_mut_ptr() as *mut f64;
    let tw = stage_twiddles.as_ptr() as *const f64;
    let mut start = 0;
    while start < n {
        let mut k = 0;
        while k < half {
            let top = ptr.add(2 * (start + k));
            let bottom = ptr.add(2 * (start + k + half));
            let w = _mm256_loadu_pd(tw.add(2 * k));
            let u = _mm256_loadu_pd(top);
            let t = cmul_256(_mm256_loadu_pd(bottom), w);
            _mm256_storeu_pd(top, _mm256_add_pd(u, t));
            _mm256_storeu_pd(bottom, _mm256_sub_pd(u, t));
            k += 2;
        }
        start += 2 * half;
    }
}

/// Butterfly stages of an iterative FFT on bit-reversed input.
///
/// # Safety
/// SSE2 must be available. `twiddles` must hold the per-stage tables laid
/// out by `FftEngine` (`len - 1` entries), `data.len()` a power of two.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
pub unsafe fn fft_narrow(data: &mut [Complex64], twiddles: &[Complex64]) {
    let n = data.len();
    let mut half = 1;
    while half < n {
        stage_128(data, &twiddles[half - 1..2 * half - 1], half);
        half *= 2;
    }
}

/// Wide-lane variant of [`fft_narrow`]. The first stage has a single
/// butterfly per group and runs on the narrow kernel.
///
/// # Safety
/// AVX must be available, otherwise as [`fft_narrow`].
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn fft_wide(data: &mut [Complex64], twiddles: &[Complex64]) {
    let n = data.len();
    let mut half = 1;
    while half < n {
        let stage = &twiddles[half - 1..2 * half - 1];
        if half == 1 {
            stage_128(data, stage, half);
        } else {
            stage_256(data, stage, half);
        }
        half *= 2;
    }
}

/// Range-reduced cosine for x in [0, 2π], two lanes
#[cfg(target_arch = "x86_64")]
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn cos_128(x: __m128d) -> __m128d {
    let folded = _mm_min_pd(x, _mm_sub_pd(_mm_set1_pd(TAU), x));
    let mask = _mm_cmpgt_pd(folded, _mm_set1_pd(FRAC_PI_2));
    let reflected = _mm_sub_pd(_mm_set1_pd(PI), folded);
    let y = _mm_or_pd(_mm_and_pd(mask, reflected), _mm_andnot_pd(mask, folded));
    let sign = _mm_and_pd(mask, _mm_set1_pd(-0.0));

    let z = _mm_mul_pd(y, y);
    let mut p = _mm_set1_pd(COS_POLY[0]);
    for &c in &COS_POLY[1..] {
        p = _mm_add_pd(_mm_mul_pd(p, z), _mm_set1_pd(c));
    }
    _mm_xor_pd(p, sign)
}

/// Range-reduced cosine for x in [0, 2π], four lanes
#[cfg(target_arch = "x86_64")]
#[inline]
#[target_feature(enable = "avx")]
unsafe fn cos_256(x: __m256d) -> __m256d {
    let folded = _mm256_min_pd(x, _mm256_sub_pd(_mm256_set1_pd(TAU), x));
    let mask = _mm256_cmp_pd(folded, _mm256_set1_pd(FRAC_PI_2), _CMP_GT_OQ);
    let reflected = _mm256_sub_pd(_mm256_set1_pd(PI), folded);
    let y = _mm256_blendv_pd(folded, reflected, mask);
    let sign = _mm256_and_pd(mask, _mm256_set1_pd(-0.0));

    let z = _mm256_mul_pd(y, y);
    let mut p = _mm256_set1_pd(COS_POLY[0]);
    for &c in &COS_POLY[1..] {
        p = _mm256_add_pd(_mm256_mul_pd(p, z), _mm256_set1_pd(c));
    }
    _mm256_xor_pd(p, sign)
}

/// Fill `out` with `a0 − a1·cos(i·step)`, clamped to [0, 1].
///
/// # Safety
/// SSE2 must be available and `out.len()` must be even.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
pub unsafe fn cosine_window_narrow(out: &mut [f32], a0: f64, a1: f64, step: f64) {
    let a0v = _mm_set1_pd(a0);
    let a1v = _mm_set1_pd(a1);
    let stepv = _mm_set1_pd(step);
    let zero = _mm_setzero_pd();
    let one = _mm_set1_pd(1.0);
    let mut lanes = [0.0f64; 2];

    for (chunk_index, chunk) in out.chunks_exact_mut(2).enumerate() {
        let i = (chunk_index * 2) as f64;
        let x = _mm_mul_pd(_mm_set_pd(i + 1.0, i), stepv);
        let w = _mm_sub_pd(a0v, _mm_mul_pd(a1v, cos_128(x)));
        let w = _mm_min_pd(_mm_max_pd(w, zero), one);
        _mm_storeu_pd(lanes.as_mut_ptr(), w);
        chunk[0] = lanes[0] as f32;
        chunk[1] = lanes[1] as f32;
    }
}

/// Four-lane variant of [`cosine_window_narrow`].
///
/// # Safety
/// AVX must be available and `out.len()` must be a multiple of four.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn cosine_window_wide(out: &mut [f32], a0: f64, a1: f64, step: f64) {
    let a0v = _mm256_set1_pd(a0);
    let a1v = _mm256_set1_pd(a1);
    let stepv = _mm256_set1_pd(step);
    let zero = _mm256_setzero_pd();
    let one = _mm256_set1_pd(1.0);
    let mut lanes = [0.0f64; 4];

    for (chunk_index, chunk) in out.chunks_exact_mut(4).enumerate() {
        let i = (chunk_index * 4) as f64;
        let x = _mm256_mul_pd(_mm256_set_pd(i + 3.0, i + 2.0, i + 1.0, i), stepv);
        let w = _mm256_sub_pd(a0v, _mm256_mul_pd(a1v, cos_256(x)));
        let w = _mm256_min_pd(_mm256_max_pd(w, zero), one);
        _mm256_storeu_pd(lanes.as_mut_ptr(), w);
        for (dst, &src) in chunk.iter_mut().zip(lanes.iter()) {
            *dst = src as f32;
        }
    }
}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_packed_complex_multiply() {
        let a = Complex64::new(1.5, -2.0);
        let b = Complex64::new(-0.25, 3.0);
        let expected = a * b;

        let mut out = [0.0f64; 2];
        unsafe {
            let va = _mm_set_pd(a.im, a.re);
            let vb = _mm_set_pd(b.im, b.re);
            _mm_storeu_pd(out.as_mut_ptr(), cmul_128(va, vb));
        }
        assert_abs_diff_eq!(out[0], expected.re, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], expected.im, epsilon = 1e-12);
    }

    #[test]
    fn test_packed_complex_multiply_wide() {
        if !avx_available() {
            return;
        }
        let a = [Complex64::new(0.5, 1.0), Complex64::new(-3.0, 0.25)];
        let b = [Complex64::new(2.0, -1.0), Complex64::new(0.0, 1.0)];

        let mut out = [0.0f64; 4];
        unsafe {
            let va = _mm256_loadu_pd(a.as_ptr() as *const f64);
            let vb = _mm256_loadu_pd(b.as_ptr() as *const f64);
            _mm256_storeu_pd(out.as_mut_ptr(), cmul_256(va, vb));
        }
        for lane in 0..2 {
            let expected = a[lane] * b[lane];
            assert_abs_diff_eq!(out[2 * lane], expected.re, epsilon = 1e-12);
            assert_abs_diff_eq!(out[2 * lane + 1], expected.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_range_reduced_cosine_full_turn() {
        let mut out = [0.0f64; 2];
        for step in 0..=256 {
            let x = TAU * step as f64 / 256.0;
            unsafe {
                _mm_storeu_pd(out.as_mut_ptr(), cos_128(_mm_set1_pd(x)));
            }
            assert_abs_diff_eq!(out[0], x.cos(), epsilon = 1e-8);
        }
    }
}
