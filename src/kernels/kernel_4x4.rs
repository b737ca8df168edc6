//! 4×4 portable microkernel, the baseline for every type pair.

use crate::element::{Accumulator, Operand};

/// Computes a 4×4 tile: C[0:4, 0:4] += A_packed × B_packed
///
/// Plain scalar code with 16 accumulators in the accumulator type. Integer
/// types wrap exactly like the SIMD kernels, so results match them
/// bit-for-bit. Needs no CPU feature and exists for every [`Operand`].
///
/// # Safety
///
/// Caller must ensure:
/// - `a_pack` points to `k * 4` contiguous values (packed A tile, k_unroll 1)
/// - `b_pack` points to `k * 4` contiguous values (packed B tile, k_unroll 1)
/// - `c.add(row * ldc)` is valid for row in 0..4, each allowing read/write of 4 values
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_4x4<T: Operand>(
    a_pack: *const T,
    b_pack: *const T,
    c: *mut T::Acc,
    k: usize,
    ldc: usize,
) {
    let mut acc = [[T::Acc::ZERO; 4]; 4];

    for p in 0..k {
        let a = std::slice::from_raw_parts(a_pack.add(p * 4), 4);
        let b = std::slice::from_raw_parts(b_pack.add(p * 4), 4);

        for (row, &a_val) in acc.iter_mut().zip(a) {
            let a_wide = a_val.widen();
            for (out, &b_val) in row.iter_mut().zip(b) {
                *out = out.acc_madd(a_wide, b_val.widen());
            }
        }
    }

    for (i, row) in acc.iter().enumerate() {
        let c_row = std::slice::from_raw_parts_mut(c.add(i * ldc), 4);
        for (dst, &val) in c_row.iter_mut().zip(row) {
            *dst = dst.acc_add(val);
        }
    }
}
