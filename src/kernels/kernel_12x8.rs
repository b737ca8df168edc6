//! 12×8 AVX2 microkernels.
//!
//! Twelve accumulators (one YMM per output row) plus one B vector and one A
//! broadcast fit the sixteen YMM registers. The integer kernels consume K in
//! pairs: each packed group holds two K positions per row/column, widened to
//! i16 and combined with `vpmaddwd`, which is exact for 8-bit inputs.

#![cfg(target_arch = "x86_64")]

use std::arch::x86_64::*;

macro_rules! define_int_kernel_12x8 {
    ($name:ident, $ty:ty, $acc:ty, $widen:ident, $pair:expr) => {
        /// Computes a 12×8 tile: C[0:12, 0:8] += A_packed × B_packed
        ///
        /// Packed layout (k_unroll 2): each K pair occupies 24 bytes of A
        /// (row-major pairs) and 16 bytes of B (column-major pairs).
        /// Accumulation wraps in 32 bits.
        ///
        /// # Safety
        ///
        /// Caller must ensure:
        /// - CPU supports AVX2 (checked via `#[target_feature]`)
        /// - `k` is even, `a_pack` points to `k * 12` values and `b_pack` to `k * 8`
        /// - `c.add(row * ldc)` is valid for row in 0..12, each allowing read/write of 8 values
        #[target_feature(enable = "avx2")]
        #[allow(unsafe_op_in_unsafe_fn)]
        pub unsafe fn $name(
            a_pack: *const $ty,
            b_pack: *const $ty,
            c: *mut $acc,
            k: usize,
            ldc: usize,
        ) {
            let mut acc = [_mm256_setzero_si256(); 12];
            for (row, reg) in acc.iter_mut().enumerate() {
                *reg = _mm256_loadu_si256(c.add(row * ldc) as *const __m256i);
            }

            for g in 0..k / 2 {
                let b_bytes = _mm_loadu_si128(b_pack.add(g * 16) as *const __m128i);
                let b_vec = $widen(b_bytes);
                let a_group = a_pack.add(g * 24);

                for (row, reg) in acc.iter_mut().enumerate() {
                    let lo = *a_group.add(row * 2);
                    let hi = *a_group.add(row * 2 + 1);
                    let a_pair = _mm256_set1_epi32($pair(lo, hi));
                    *reg = _mm256_add_epi32(*reg, _mm256_madd_epi16(a_pair, b_vec));
                }
            }

            for (row, reg) in acc.iter().enumerate() {
                _mm256_storeu_si256(c.add(row * ldc) as *mut __m256i, *reg);
            }
        }
    };
}

/// Two u8 values as adjacent i16 lanes of one i32.
#[inline(always)]
fn pair_u8(lo: u8, hi: u8) -> i32 {
    (lo as i32) | ((hi as i32) << 16)
}

/// Two i8 values, sign-extended, as adjacent i16 lanes of one i32.
#[inline(always)]
fn pair_i8(lo: i8, hi: i8) -> i32 {
    ((lo as i16 as u16) as i32) | ((hi as i32) << 16)
}

define_int_kernel_12x8!(kernel_u8_12x8_avx2, u8, u32, _mm256_cvtepu8_epi16, pair_u8);
define_int_kernel_12x8!(kernel_i8_12x8_avx2, i8, i32, _mm256_cvtepi8_epi16, pair_i8);

/// Computes a 12×8 tile: C[0:12, 0:8] += A_packed × B_packed
///
/// One FMA per output row per K step: the B row is loaded once as a YMM of 8
/// floats and each A value is broadcast against it.
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX2 and FMA (checked via `#[target_feature]`)
/// - `a_pack` points to `k * 12` contiguous f32 values (packed A tile)
/// - `b_pack` points to `k * 8` contiguous f32 values (packed B tile)
/// - `c.add(row * ldc)` is valid for row in 0..12, each allowing read/write of 8 f32s
#[target_feature(enable = "avx2,fma")]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_f32_12x8_avx2(
    a_pack: *const f32,
    b_pack: *const f32,
    c: *mut f32,
    k: usize,
    ldc: usize,
) {
    let mut acc = [_mm256_setzero_ps(); 12];
    for (row, reg) in acc.iter_mut().enumerate() {
        *reg = _mm256_loadu_ps(c.add(row * ldc));
    }

    for p in 0..k {
        let b_vec = _mm256_loadu_ps(b_pack.add(p * 8));
        let a_col = a_pack.add(p * 12);

        for (row, reg) in acc.iter_mut().enumerate() {
            *reg = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_col.add(row)), b_vec, *reg);
        }
    }

    for (row, reg) in acc.iter().enumerate() {
        _mm256_storeu_ps(c.add(row * ldc), *reg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Interleaves a row-major 12×k A and k×8 B with the given k_unroll.
    fn pack_pair<T: Copy + Default>(a: &[T], b: &[T], k: usize, unroll: usize) -> (Vec<T>, Vec<T>) {
        let mut a_pack = vec![T::default(); k * 12];
        let mut b_pack = vec![T::default(); k * 8];
        for g in 0..k / unroll {
            for i in 0..12 {
                for q in 0..unroll {
                    a_pack[g * 12 * unroll + i * unroll + q] = a[i * k + g * unroll + q];
                }
            }
            for j in 0..8 {
                for q in 0..unroll {
                    b_pack[g * 8 * unroll + j * unroll + q] = b[(g * unroll + q) * 8 + j];
                }
            }
        }
        (a_pack, b_pack)
    }

    #[test]
    fn test_kernel_u8_12x8_correctness() {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return;
        }

        let k = 16;
        let a: Vec<u8> = (0..12 * k).map(|i| (i * 29 % 256) as u8).collect();
        let b: Vec<u8> = (0..k * 8).map(|i| (255 - i % 256) as u8).collect();
        let (a_pack, b_pack) = pack_pair(&a, &b, k, 2);
        let mut c = vec![7u32; 12 * 8];

        unsafe {
            kernel_u8_12x8_avx2(a_pack.as_ptr(), b_pack.as_ptr(), c.as_mut_ptr(), k, 8);
        }

        for i in 0..12 {
            for j in 0..8 {
                let expected: u32 =
                    7 + (0..k).map(|p| a[i * k + p] as u32 * b[p * 8 + j] as u32).sum::<u32>();
                assert_eq!(c[i * 8 + j], expected, "Mismatch at ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_kernel_i8_12x8_extremes() {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return;
        }

        let k = 8;
        let values = [-128i8, 127, -1, 0, 1, -127];
        let a: Vec<i8> = (0..12 * k).map(|i| values[i % values.len()]).collect();
        let b: Vec<i8> = (0..k * 8).map(|i| values[(i * 5) % values.len()]).collect();
        let (a_pack, b_pack) = pack_pair(&a, &b, k, 2);
        let mut c = vec![0i32; 12 * 8];

        unsafe {
            kernel_i8_12x8_avx2(a_pack.as_ptr(), b_pack.as_ptr(), c.as_mut_ptr(), k, 8);
        }

        for i in 0..12 {
            for j in 0..8 {
                let expected: i32 = (0..k).map(|p| a[i * k + p] as i32 * b[p * 8 + j] as i32).sum();
                assert_eq!(c[i * 8 + j], expected, "Mismatch at ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_kernel_f32_12x8_correctness() {
        if !is_x86_feature_detected!("avx2") || !is_x86_feature_detected!("fma") {
            println!("Skipping - AVX2/FMA not available");
            return;
        }

        let k = 16;
        let a: Vec<f32> = (0..12 * k).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..k * 8).map(|i| (i % 10) as f32).collect();
        let (a_pack, b_pack) = pack_pair(&a, &b, k, 1);
        let mut c = vec![0.0f32; 12 * 8];

        unsafe {
            kernel_f32_12x8_avx2(a_pack.as_ptr(), b_pack.as_ptr(), c.as_mut_ptr(), k, 8);
        }

        for i in 0..12 {
            for j in 0..8 {
                let expected: f32 = (0..k).map(|p| a[i * k + p] * b[p * 8 + j]).sum();
                assert!(
                    (c[i * 8 + j] - expected).abs() <= 1e-3 * expected.abs().max(1.0),
                    "Mismatch at ({}, {}): got {}, expected {}",
                    i,
                    j,
                    c[i * 8 + j],
                    expected
                );
            }
        }
    }
}
