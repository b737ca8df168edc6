//! CPU capability snapshot consumed by kernel selection.
//!
//! A [`CapabilitySet`] is built once, usually through
//! [`CapabilitySet::detect`], and passed by reference into
//! [`make_gemm`](crate::make_gemm). Nothing in the crate reads CPU features
//! on its own, so tests can drive selection with narrowed or synthetic sets.

use std::fmt;
use std::sync::OnceLock;

/// A CPU feature that gates one or more kernel variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuFeature {
    /// x86_64 AVX2 (256-bit integer and float lanes).
    Avx2,
    /// x86_64 fused multiply-add.
    Fma,
    /// x86_64 AVX-512 Foundation.
    Avx512f,
    /// aarch64 Advanced SIMD.
    Neon,
}

impl CpuFeature {
    pub const ALL: [CpuFeature; 4] = [
        CpuFeature::Avx2,
        CpuFeature::Fma,
        CpuFeature::Avx512f,
        CpuFeature::Neon,
    ];

    const fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Immutable set of CPU features.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet {
    bits: u32,
}

impl CapabilitySet {
    /// The empty set. Only baseline kernels are eligible.
    pub const fn baseline() -> Self {
        Self { bits: 0 }
    }

    /// Reads the features of the executing CPU.
    ///
    /// The CPU is queried once per process; later calls return the cached set.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<CapabilitySet> = OnceLock::new();
        *DETECTED.get_or_init(Self::query_cpu)
    }

    fn query_cpu() -> Self {
        let mut bits = 0;

        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                bits |= CpuFeature::Avx2.bit();
            }
            if is_x86_feature_detected!("fma") {
                bits |= CpuFeature::Fma.bit();
            }
            if is_x86_feature_detected!("avx512f") {
                bits |= CpuFeature::Avx512f.bit();
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            if std::arch::is_aarch64_feature_detected!("neon") {
                bits |= CpuFeature::Neon.bit();
            }
        }

        let caps = Self { bits };
        log::info!("detected cpu capabilities: {:?}", caps);
        caps
    }

    /// Builds a set from an explicit feature list without querying the CPU.
    ///
    /// # Safety
    ///
    /// Kernel selection trusts this set. If a GEMM selected with it is run,
    /// every listed feature must really be available on the executing CPU,
    /// otherwise an accelerated kernel may execute unsupported instructions.
    /// Selection-only use (never calling `run`) has no requirement.
    pub unsafe fn assume(features: &[CpuFeature]) -> Self {
        Self {
            bits: features.iter().fold(0, |acc, f| acc | f.bit()),
        }
    }

    /// Returns a copy with `feature` removed.
    ///
    /// Narrowing is always sound, so this is how callers force a fallback
    /// on hardware that does support the feature.
    pub const fn without(self, feature: CpuFeature) -> Self {
        Self {
            bits: self.bits & !feature.bit(),
        }
    }

    pub const fn has(&self, feature: CpuFeature) -> bool {
        self.bits & feature.bit() != 0
    }

    /// True when every feature in `required` is present. Empty is always true.
    pub fn supports_all(&self, required: &[CpuFeature]) -> bool {
        required.iter().all(|&f| self.has(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = CpuFeature> + '_ {
        CpuFeature::ALL.into_iter().filter(|&f| self.has(f))
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
