//! Sample accumulation and saturation with AVX2 SIMD optimization
//!
//! Mixed sums are kept in 32-bit lanes and clamped back to PCM16 on output.
//! The clamp is asymmetric: `[-32767, 32767]`, so -32768 never appears in
//! mixed output. AVX2 paths process 8 samples per iteration and fall back
//! to the scalar loop for the tail; both produce identical results.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Largest emitted sample
pub const SAMPLE_MAX: i32 = 32767;
/// Smallest emitted sample
pub const SAMPLE_MIN: i32 = -32767;

/// Samples per AVX2 lane group (8 x i32 in a 256-bit register)
pub const LANES: usize = 8;

/// Clamp a wide sum into the emitted PCM16 range
#[inline]
pub fn saturate_sample(sum: i32) -> i16 {
    sum.clamp(SAMPLE_MIN, SAMPLE_MAX) as i16
}

/// Add `input` into `sum` elementwise (scalar)
pub fn accumulate_scalar(sum: &mut [i32], input: &[i16]) {
    for (acc, &sample) in sum.iter_mut().zip(input) {
        *acc += sample as i32;
    }
}

/// `out = saturate(sum)` (scalar)
pub fn saturate_scalar(out: &mut [i16], sum: &[i32]) {
    for (dst, &acc) in out.iter_mut().zip(sum) {
        *dst = saturate_sample(acc);
    }
}

/// `out = saturate(sum - own)` (scalar)
pub fn subtract_saturate_scalar(out: &mut [i16], sum: &[i32], own: &[i16]) {
    for ((dst, &acc), &sample) in out.iter_mut().zip(sum).zip(own) {
        *dst = saturate_sample(acc - sample as i32);
    }
}

/// Add `input` into `sum` with AVX2, widening i16 to i32 before the add
///
/// # Safety
/// Requires AVX2 CPU support.
#[target_feature(enable = "avx2")]
#[cfg(target_arch = "x86_64")]
pub unsafe fn accumulate_avx2(sum: &mut [i32], input: &[i16]) {
    let len = sum.len().min(input.len());
    let mut i = 0;

    while i + LANES <= len {
        let wide = _mm256_cvtepi16_epi32(_mm_loadu_si128(input.as_ptr().add(i) as *const __m128i));
        let acc = _mm256_loadu_si256(sum.as_ptr().add(i) as *const __m256i);
        _mm256_storeu_si256(
            sum.as_mut_ptr().add(i) as *mut __m256i,
            _mm256_add_epi32(acc, wide),
        );
        i += LANES;
    }

    accumulate_scalar(&mut sum[i..len], &input[i..len]);
}

/// `out = saturate(sum)` with AVX2
///
/// # Safety
/// Requires AVX2 CPU support.
#[target_feature(enable = "avx2")]
#[cfg(target_arch = "x86_64")]
pub unsafe fn saturate_avx2(out: &mut [i16], sum: &[i32]) {
    let len = out.len().min(sum.len());
    let mut i = 0;

    while i + LANES <= len {
        let acc = _mm256_loadu_si256(sum.as_ptr().add(i) as *const __m256i);
        store_saturated(out.as_mut_ptr().add(i), acc);
        i += LANES;
    }

    saturate_scalar(&mut out[i..len], &sum[i..len]);
}

/// `out = saturate(sum - own)` with AVX2
///
/// # Safety
/// Requires AVX2 CPU support.
#[target_feature(enable = "avx2")]
#[cfg(target_arch = "x86_64")]
pub unsafe fn subtract_saturate_avx2(out: &mut [i16], sum: &[i32], own: &[i16]) {
    let len = out.len().min(sum.len()).min(own.len());
    let mut i = 0;

    while i + LANES <= len {
        let acc = _mm256_loadu_si256(sum.as_ptr().add(i) as *const __m256i);
        let wide = _mm256_cvtepi16_epi32(_mm_loadu_si128(own.as_ptr().add(i) as *const __m128i));
        store_saturated(out.as_mut_ptr().add(i), _mm256_sub_epi32(acc, wide));
        i += LANES;
    }

    subtract_saturate_scalar(&mut out[i..len], &sum[i..len], &own[i..len]);
}

/// Clamp 8 i32 lanes and store them as 8 i16 at `out`
#[target_feature(enable = "avx2")]
#[cfg(target_arch = "x86_64")]
#[inline]
unsafe fn store_saturated(out: *mut i16, v: __m256i) {
    let clamped = _mm256_max_epi32(
        _mm256_min_epi32(v, _mm256_set1_epi32(SAMPLE_MAX)),
        _mm256_set1_epi32(SAMPLE_MIN),
    );
    // packs works per 128-bit half: [a0..a3 a0..a3 | a4..a7 a4..a7]
    let packed = _mm256_packs_epi32(clamped, clamped);
    let ordered = _mm256_permute4x64_epi64(packed, 0b00_00_10_00);
    _mm_storeu_si128(out as *mut __m128i, _mm256_castsi256_si128(ordered));
}

/// Whether the AVX2 paths can run on this CPU
pub fn has_avx2() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: i32) -> Vec<i16> {
        (0..len)
            .map(|i| (((i as i32 * 7919 + seed) % 65536) - 32768) as i16)
            .collect()
    }

    #[test]
    fn test_saturate_range() {
        assert_eq!(saturate_sample(0), 0);
        assert_eq!(saturate_sample(32767), 32767);
        assert_eq!(saturate_sample(32768), 32767);
        assert_eq!(saturate_sample(-32767), -32767);
        assert_eq!(saturate_sample(-32768), -32767, "clamp is asymmetric");
        assert_eq!(saturate_sample(i32::MIN), -32767);
        assert_eq!(saturate_sample(128 * 32767), 32767);
    }

    #[test]
    fn test_saturate_idempotent() {
        for value in (-70000..70000).step_by(13).chain([i32::MIN, i32::MAX]) {
            let once = saturate_sample(value);
            assert_eq!(saturate_sample(once as i32), once, "value {}", value);
        }
    }

    #[test]
    fn test_accumulate_full_table_no_overflow() {
        let mut sum = vec![0i32; 4];
        for _ in 0..128 {
            accumulate_scalar(&mut sum, &[i16::MAX, i16::MIN, 1, -1]);
        }
        assert_eq!(sum, vec![128 * 32767, 128 * -32768, 128, -128]);
    }

    #[test]
    fn test_subtract_saturate_scalar() {
        let sum = [290, -15, 40000, -40000];
        let own = [100, -50, 0, 0];
        let mut out = [0i16; 4];
        subtract_saturate_scalar(&mut out, &sum, &own);
        assert_eq!(out, [190, 35, 32767, -32767]);
    }

    #[test]
    #[cfg(target_arch = "x86_64")]
    fn test_avx2_vs_scalar() {
        if !has_avx2() {
            return; // Skip if no AVX2 support
        }

        // 1003 exercises the scalar tail after the 8-lane loop
        for len in [8, 160, 1003] {
            let inputs: Vec<Vec<i16>> = (0..128).map(|seed| pattern(len, seed * 31)).collect();

            let mut sum_scalar = vec![0i32; len];
            let mut sum_avx = vec![0i32; len];
            for input in &inputs {
                accumulate_scalar(&mut sum_scalar, input);
                unsafe { accumulate_avx2(&mut sum_avx, input) };
            }
            assert_eq!(sum_scalar, sum_avx, "accumulate mismatch at len {}", len);

            let mut out_scalar = vec![0i16; len];
            let mut out_avx = vec![0i16; len];
            saturate_scalar(&mut out_scalar, &sum_scalar);
            unsafe { saturate_avx2(&mut out_avx, &sum_avx) };
            assert_eq!(out_scalar, out_avx, "saturate mismatch at len {}", len);

            subtract_saturate_scalar(&mut out_scalar, &sum_scalar, &inputs[3]);
            unsafe { subtract_saturate_avx2(&mut out_avx, &sum_avx, &inputs[3]) };
            assert_eq!(out_scalar, out_avx, "subtract mismatch at len {}", len);
        }
    }

    #[test]
    #[cfg(target_arch = "x86_64")]
    fn test_avx2_lane_order() {
        if !has_avx2() {
            return;
        }

        let sum: Vec<i32> = (0..16).map(|i| i * 1000 - 8000).collect();
        let mut out = vec![0i16; 16];
        unsafe { saturate_avx2(&mut out, &sum) };
        let expected: Vec<i16> = sum.iter().map(|&s| s as i16).collect();
        assert_eq!(out, expected);
    }
}
