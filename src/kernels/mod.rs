//! Micro-kernels and the per-type kernel tables.
//!
//! A micro-kernel computes one `out_height × out_width` tile of
//! C += A_packed × B_packed, reading operands in the interleaved layout
//! written by [`crate::matrix::interleave`]. Kernels always see full tiles,
//! so their inner loops carry no bounds checks.
//!
//! Available kernels:
//! - `kernel_4x4`: portable 4×4 baseline for every type pair
//! - `kernel_12x8`: 12×8 AVX2 kernels (u8, i8 and f32)
//! - `kernel_8x16`: 8×16 AVX-512 kernel (f32)
//! - `kernel_8x8`: 8×8 NEON kernels (u8, i8 and f32)

use std::fmt;

use crate::capability::{CapabilitySet, CpuFeature};
use crate::element::{ElementType, Operand};
use crate::error::{GemmError, Result};

pub mod kernel_12x8;
pub mod kernel_4x4;
pub mod kernel_8x16;
pub mod kernel_8x8;

/// Kernel entry point.
///
/// Arguments are `(a_pack, b_pack, c, k, ldc)`: one packed A tile, one packed
/// B tile, the top-left element of a row-major output tile with row stride
/// `ldc`, and the packed depth `k` (a multiple of the kernel's `k_unroll`).
/// The kernel accumulates into `c`.
pub type KernelFn<T> =
    unsafe fn(*const T, *const T, *mut <T as Operand>::Acc, usize, usize);

/// Static description of one micro-kernel variant.
pub struct KernelDescriptor<T: Operand> {
    pub name: &'static str,
    /// Rows of C per tile (along M).
    pub out_height: usize,
    /// Columns of C per tile (along N).
    pub out_width: usize,
    /// K positions interleaved together in the packed layout.
    pub k_unroll: usize,
    /// Features that must all be present for this variant to be eligible.
    pub requires: &'static [CpuFeature],
    pub kernel: KernelFn<T>,
}

impl<T: Operand> KernelDescriptor<T> {
    pub const fn tile_area(&self) -> usize {
        self.out_height * self.out_width
    }

    pub const fn is_baseline(&self) -> bool {
        self.requires.is_empty()
    }

    pub const fn element(&self) -> ElementType {
        T::TYPE
    }
}

impl<T: Operand> fmt::Debug for KernelDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelDescriptor")
            .field("name", &self.name)
            .field("out_height", &self.out_height)
            .field("out_width", &self.out_width)
            .field("k_unroll", &self.k_unroll)
            .field("requires", &self.requires)
            .finish()
    }
}

pub static U8_KERNELS: &[KernelDescriptor<u8>] = &[
    #[cfg(target_arch = "x86_64")]
    KernelDescriptor {
        name: "u8_12x8_avx2",
        out_height: 12,
        out_width: 8,
        k_unroll: 2,
        requires: &[CpuFeature::Avx2],
        kernel: kernel_12x8::kernel_u8_12x8_avx2,
    },
    #[cfg(target_arch = "aarch64")]
    KernelDescriptor {
        name: "u8_8x8_neon",
        out_height: 8,
        out_width: 8,
        k_unroll: 1,
        requires: &[CpuFeature::Neon],
        kernel: kernel_8x8::kernel_u8_8x8_neon,
    },
    KernelDescriptor {
        name: "u8_4x4",
        out_height: 4,
        out_width: 4,
        k_unroll: 1,
        requires: &[],
        kernel: kernel_4x4::kernel_4x4::<u8>,
    },
];

pub static I8_KERNELS: &[KernelDescriptor<i8>] = &[
    #[cfg(target_arch = "x86_64")]
    KernelDescriptor {
        name: "i8_12x8_avx2",
        out_height: 12,
        out_width: 8,
        k_unroll: 2,
        requires: &[CpuFeature::Avx2],
        kernel: kernel_12x8::kernel_i8_12x8_avx2,
    },
    #[cfg(target_arch = "aarch64")]
    KernelDescriptor {
        name: "i8_8x8_neon",
        out_height: 8,
        out_width: 8,
        k_unroll: 1,
        requires: &[CpuFeature::Neon],
        kernel: kernel_8x8::kernel_i8_8x8_neon,
    },
    KernelDescriptor {
        name: "i8_4x4",
        out_height: 4,
        out_width: 4,
        k_unroll: 1,
        requires: &[],
        kernel: kernel_4x4::kernel_4x4::<i8>,
    },
];

pub static F32_KERNELS: &[KernelDescriptor<f32>] = &[
    #[cfg(target_arch = "x86_64")]
    KernelDescriptor {
        name: "f32_8x16_avx512",
        out_height: 8,
        out_width: 16,
        k_unroll: 1,
        requires: &[CpuFeature::Avx512f, CpuFeature::Fma],
        kernel: kernel_8x16::kernel_f32_8x16_avx512,
    },
    #[cfg(target_arch = "x86_64")]
    KernelDescriptor {
        name: "f32_12x8_avx2",
        out_height: 12,
        out_width: 8,
        k_unroll: 1,
        requires: &[CpuFeature::Avx2, CpuFeature::Fma],
        kernel: kernel_12x8::kernel_f32_12x8_avx2,
    },
    #[cfg(target_arch = "aarch64")]
    KernelDescriptor {
        name: "f32_8x8_neon",
        out_height: 8,
        out_width: 8,
        k_unroll: 1,
        requires: &[CpuFeature::Neon],
        kernel: kernel_8x8::kernel_f32_8x8_neon,
    },
    KernelDescriptor {
        name: "f32_4x4",
        out_height: 4,
        out_width: 4,
        k_unroll: 1,
        requires: &[],
        kernel: kernel_4x4::kernel_4x4::<f32>,
    },
];

/// Picks the kernel with the largest tile among those `caps` supports.
///
/// Ties keep the earlier table entry. The table must contain a baseline
/// (capability-free) entry; without one this is a configuration error even
/// when an accelerated variant would be eligible.
pub fn select_kernel<'t, T: Operand>(
    table: &'t [KernelDescriptor<T>],
    caps: &CapabilitySet,
) -> Result<&'t KernelDescriptor<T>> {
    if !table.iter().any(KernelDescriptor::is_baseline) {
        return Err(GemmError::NoBaselineKernel(T::TYPE));
    }

    let mut best: Option<&KernelDescriptor<T>> = None;
    for desc in table.iter().filter(|d| caps.supports_all(d.requires)) {
        if best.is_none_or(|b| desc.tile_area() > b.tile_area()) {
            best = Some(desc);
        }
    }

    let chosen = best.ok_or(GemmError::NoBaselineKernel(T::TYPE))?;
    log::debug!(
        "selected kernel {} ({}x{}, k_unroll {}) for {:?} with {:?}",
        chosen.name,
        chosen.out_height,
        chosen.out_width,
        chosen.k_unroll,
        chosen.element(),
        caps
    );
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(features: &[CpuFeature]) -> CapabilitySet {
        unsafe { CapabilitySet::assume(features) }
    }

    #[test]
    fn test_every_table_has_a_baseline() {
        assert!(U8_KERNELS.iter().any(|d| d.is_baseline()));
        assert!(I8_KERNELS.iter().any(|d| d.is_baseline()));
        assert!(F32_KERNELS.iter().any(|d| d.is_baseline()));
    }

    #[test]
    fn test_baseline_caps_select_baseline() {
        let caps = CapabilitySet::baseline();
        assert_eq!(select_kernel(U8_KERNELS, &caps).unwrap().name, "u8_4x4");
        assert_eq!(select_kernel(I8_KERNELS, &caps).unwrap().name, "i8_4x4");
        assert_eq!(select_kernel(F32_KERNELS, &caps).unwrap().name, "f32_4x4");
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_widest_eligible_tile_wins() {
        let avx2 = synthetic(&[CpuFeature::Avx2, CpuFeature::Fma]);
        assert_eq!(select_kernel(U8_KERNELS, &avx2).unwrap().name, "u8_12x8_avx2");
        assert_eq!(select_kernel(F32_KERNELS, &avx2).unwrap().name, "f32_12x8_avx2");

        let avx512 = synthetic(&[CpuFeature::Avx2, CpuFeature::Fma, CpuFeature::Avx512f]);
        assert_eq!(
            select_kernel(F32_KERNELS, &avx512).unwrap().name,
            "f32_8x16_avx512"
        );
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_partial_feature_match_falls_back() {
        // FMA alone is not enough for the f32 AVX2 kernel.
        let fma_only = synthetic(&[CpuFeature::Fma]);
        assert_eq!(select_kernel(F32_KERNELS, &fma_only).unwrap().name, "f32_4x4");

        let no_avx2 = synthetic(&[CpuFeature::Avx2]).without(CpuFeature::Avx2);
        assert_eq!(select_kernel(U8_KERNELS, &no_avx2).unwrap().name, "u8_4x4");
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_neon_kernels_selected_on_aarch64() {
        let neon = synthetic(&[CpuFeature::Neon]);
        assert_eq!(select_kernel(U8_KERNELS, &neon).unwrap().name, "u8_8x8_neon");
        assert_eq!(select_kernel(I8_KERNELS, &neon).unwrap().name, "i8_8x8_neon");
        assert_eq!(select_kernel(F32_KERNELS, &neon).unwrap().name, "f32_8x8_neon");
        assert_eq!(
            select_kernel(F32_KERNELS, &neon.without(CpuFeature::Neon)).unwrap().name,
            "f32_4x4"
        );
    }

    #[test]
    fn test_selected_kernel_reports_its_element() {
        let caps = CapabilitySet::detect();
        assert_eq!(select_kernel(U8_KERNELS, &caps).unwrap().element(), ElementType::U8);
        assert_eq!(select_kernel(F32_KERNELS, &caps).unwrap().element(), ElementType::F32);
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        static TIED: &[KernelDescriptor<u8>] = &[
            KernelDescriptor {
                name: "first",
                out_height: 4,
                out_width: 4,
                k_unroll: 1,
                requires: &[],
                kernel: kernel_4x4::kernel_4x4::<u8>,
            },
            KernelDescriptor {
                name: "second",
                out_height: 4,
                out_width: 4,
                k_unroll: 1,
                requires: &[],
                kernel: kernel_4x4::kernel_4x4::<u8>,
            },
        ];
        let chosen = select_kernel(TIED, &CapabilitySet::baseline()).unwrap();
        assert_eq!(chosen.name, "first");
    }

    #[test]
    fn test_missing_baseline_is_an_error() {
        static NO_BASELINE: &[KernelDescriptor<u8>] = &[KernelDescriptor {
            name: "accelerated_only",
            out_height: 4,
            out_width: 4,
            k_unroll: 1,
            requires: &[CpuFeature::Neon],
            kernel: kernel_4x4::kernel_4x4::<u8>,
        }];
        let caps = synthetic(&[CpuFeature::Neon]);
        assert_eq!(
            select_kernel(NO_BASELINE, &caps).unwrap_err(),
            GemmError::NoBaselineKernel(ElementType::U8)
        );
    }
}
