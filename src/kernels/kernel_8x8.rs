//! 8×8 NEON microkernels.
//!
//! Each output row lives in two Q registers of four lanes, so the tile uses
//! 16 accumulators and leaves the rest of the 32-register file for B. The
//! integer kernels widen B to 16 bits once per K step and multiply-accumulate
//! each A value into 32-bit lanes with `vmlal_n`, which wraps like the
//! baseline.

#![cfg(target_arch = "aarch64")]

use std::arch::aarch64::*;

macro_rules! define_int_kernel_8x8 {
    (
        $name:ident, $ty:ty, $acc:ty, $half:ty,
        $load:ident, $widen:ident, $low:ident, $high:ident,
        $mlal:ident, $zero:ident, $load_acc:ident, $store_acc:ident
    ) => {
        /// Computes an 8×8 tile: C[0:8, 0:8] += A_packed × B_packed
        ///
        /// Packed layout (k_unroll 1): 8 values of A then 8 values of B per K
        /// step. Accumulation wraps in 32 bits.
        ///
        /// # Safety
        ///
        /// Caller must ensure:
        /// - CPU supports NEON (checked via `#[target_feature]`)
        /// - `a_pack` points to `k * 8` values and `b_pack` to `k * 8`
        /// - `c.add(row * ldc)` is valid for row in 0..8, each allowing read/write of 8 values
        #[target_feature(enable = "neon")]
        #[allow(unsafe_op_in_unsafe_fn)]
        pub unsafe fn $name(
            a_pack: *const $ty,
            b_pack: *const $ty,
            c: *mut $acc,
            k: usize,
            ldc: usize,
        ) {
            let mut acc = [[$zero(0); 2]; 8];
            for (row, regs) in acc.iter_mut().enumerate() {
                regs[0] = $load_acc(c.add(row * ldc));
                regs[1] = $load_acc(c.add(row * ldc + 4));
            }

            for p in 0..k {
                let b_wide = $widen($load(b_pack.add(p * 8)));
                let (b_lo, b_hi) = ($low(b_wide), $high(b_wide));
                let a_col = a_pack.add(p * 8);

                for (row, regs) in acc.iter_mut().enumerate() {
                    let a = *a_col.add(row) as $half;
                    regs[0] = $mlal(regs[0], b_lo, a);
                    regs[1] = $mlal(regs[1], b_hi, a);
                }
            }

            for (row, regs) in acc.iter().enumerate() {
                $store_acc(c.add(row * ldc), regs[0]);
                $store_acc(c.add(row * ldc + 4), regs[1]);
            }
        }
    };
}

define_int_kernel_8x8!(
    kernel_u8_8x8_neon, u8, u32, u16,
    vld1_u8, vmovl_u8, vget_low_u16, vget_high_u16,
    vmlal_n_u16, vdupq_n_u32, vld1q_u32, vst1q_u32
);
define_int_kernel_8x8!(
    kernel_i8_8x8_neon, i8, i32, i16,
    vld1_s8, vmovl_s8, vget_low_s16, vget_high_s16,
    vmlal_n_s16, vdupq_n_s32, vld1q_s32, vst1q_s32
);

/// Computes an 8×8 tile: C[0:8, 0:8] += A_packed × B_packed
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports NEON (checked via `#[target_feature]`)
/// - `a_pack` points to `k * 8` contiguous f32 values (packed A tile)
/// - `b_pack` points to `k * 8` contiguous f32 values (packed B tile)
/// - `c.add(row * ldc)` is valid for row in 0..8, each allowing read/write of 8 f32s
#[target_feature(enable = "neon")]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_f32_8x8_neon(
    a_pack: *const f32,
    b_pack: *const f32,
    c: *mut f32,
    k: usize,
    ldc: usize,
) {
    let mut acc = [[vdupq_n_f32(0.0); 2]; 8];
    for (row, regs) in acc.iter_mut().enumerate() {
        regs[0] = vld1q_f32(c.add(row * ldc));
        regs[1] = vld1q_f32(c.add(row * ldc + 4));
    }

    for p in 0..k {
        let b_lo = vld1q_f32(b_pack.add(p * 8));
        let b_hi = vld1q_f32(b_pack.add(p * 8 + 4));
        let a_col = a_pack.add(p * 8);

        for (row, regs) in acc.iter_mut().enumerate() {
            let a = vdupq_n_f32(*a_col.add(row));
            regs[0] = vfmaq_f32(regs[0], b_lo, a);
            regs[1] = vfmaq_f32(regs[1], b_hi, a);
        }
    }

    for (row, regs) in acc.iter().enumerate() {
        vst1q_f32(c.add(row * ldc), regs[0]);
        vst1q_f32(c.add(row * ldc + 4), regs[1]);
    }
}
