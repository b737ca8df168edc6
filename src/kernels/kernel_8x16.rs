//! 8×16 AVX-512 microkernel for f32.

#![cfg(target_arch = "x86_64")]

/// Computes an 8×16 tile: C[0:8, 0:16] += A_packed × B_packed
///
/// Uses 8 ZMM registers (512-bit) as accumulators, each holding 16 f32
/// outputs, so one K step issues 8 FMAs for 128 outputs. The widest f32 tile
/// in the table, so it wins selection whenever AVX-512 is present.
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX-512F and FMA (checked via `#[target_feature]`)
/// - `a_pack` points to `k * 8` contiguous f32 values (packed A tile)
/// - `b_pack` points to `k * 16` contiguous f32 values (packed B tile)
/// - `c.add(row * ldc)` is valid for row in 0..8, each allowing read/write of 16 f32s
#[target_feature(enable = "avx512f,fma")]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_f32_8x16_avx512(
    a_pack: *const f32,
    b_pack: *const f32,
    c: *mut f32,
    k: usize,
    ldc: usize,
) {
    use std::arch::x86_64::*;

    let mut acc = [_mm512_setzero_ps(); 8];
    for (row, reg) in acc.iter_mut().enumerate() {
        *reg = _mm512_loadu_ps(c.add(row * ldc));
    }

    for p in 0..k {
        let b_vec = _mm512_loadu_ps(b_pack.add(p * 16));
        let a_col = a_pack.add(p * 8);

        for (row, reg) in acc.iter_mut().enumerate() {
            *reg = _mm512_fmadd_ps(_mm512_set1_ps(*a_col.add(row)), b_vec, *reg);
        }
    }

    for (row, reg) in acc.iter().enumerate() {
        _mm512_storeu_ps(c.add(row * ldc), *reg);
    }
}
