use crate::element::{Accumulator, Operand};
use crate::matrix::layout::MatrixView;

/// Naive GEMM: C = alpha·(A×B) + beta·C + bias, in i-j-k order.
///
/// The straightforward triple loop with the dot product innermost. Slow, but
/// every operation goes through the same [`Accumulator`] arithmetic the
/// kernels use, so integer results are bit-exact references for the blocked
/// driver. Transposed operands are handled by the [`MatrixView`]s.
///
/// When `beta` is zero the prior content of `c` is not read.
///
/// # Arguments
///
/// * `a` - Logical A (m × k)
/// * `b` - Logical B (k × n)
/// * `c` - Output (m × n), row stride `ldc`
/// * `bias` - Optional per-column values added to every row
#[allow(clippy::too_many_arguments)]
pub fn gemm_reference<T: Operand>(
    m: usize,
    n: usize,
    k: usize,
    a: &MatrixView<'_, T>,
    b: &MatrixView<'_, T>,
    c: &mut [T::Acc],
    ldc: usize,
    alpha: T::Acc,
    beta: T::Acc,
    bias: Option<&[T::Acc]>,
) {
    for i in 0..m {
        for j in 0..n {
            let mut sum = T::Acc::ZERO;
            for p in 0..k {
                sum = sum.acc_madd(a.at(i, p).widen(), b.at(p, j).widen());
            }

            let dst = &mut c[i * ldc + j];
            let prior = if beta == T::Acc::ZERO {
                T::Acc::ZERO
            } else {
                beta.acc_mul(*dst)
            };
            let offset = bias.map_or(T::Acc::ZERO, |v| v[j]);
            *dst = alpha.acc_mul(sum).acc_add(prior).acc_add(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_2x3_times_3x2() {
        let a = [1u8, 2, 3, 4, 5, 6]; // 2x3
        let b = [7u8, 8, 9, 10, 11, 12]; // 3x2
        let mut c = [0u32; 4];

        gemm_reference(
            2,
            2,
            3,
            &MatrixView::new(&a, 3, false),
            &MatrixView::new(&b, 2, false),
            &mut c,
            2,
            1,
            0,
            None,
        );

        assert_eq!(c, [58, 64, 139, 154]);
    }

    #[test]
    fn test_reference_alpha_beta_bias() {
        let a = [1.0f32, 2.0];
        let b = [3.0f32, 4.0];
        let mut c = [10.0f32];

        // 1×2 · 2×1 = 11, 2·11 + 0.5·10 + 1 = 28
        gemm_reference(
            1,
            1,
            2,
            &MatrixView::new(&a, 2, false),
            &MatrixView::new(&b, 1, false),
            &mut c,
            1,
            2.0,
            0.5,
            Some(&[1.0]),
        );

        assert_eq!(c, [28.0]);
    }

    #[test]
    fn test_reference_beta_zero_ignores_nan() {
        let a = [1.0f32];
        let b = [1.0f32];
        let mut c = [f32::NAN];

        gemm_reference(
            1,
            1,
            1,
            &MatrixView::new(&a, 1, false),
            &MatrixView::new(&b, 1, false),
            &mut c,
            1,
            1.0,
            0.0,
            None,
        );

        assert_eq!(c, [1.0]);
    }
}
