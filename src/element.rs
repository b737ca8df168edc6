//! Operand and accumulator element types.
//!
//! Every supported numeric-type pair is an [`Operand`] impl. The operand type
//! names its accumulator type and the kernel table the dispatcher selects
//! from, so an unsupported pair simply has no `Operand` impl and fails to
//! compile.

use std::fmt::Debug;

use crate::kernels::{self, KernelDescriptor};

mod sealed {
    /// Restricts the element traits to plain-old-data types that are valid for
    /// every bit pattern, which lets workspace bytes be viewed as elements.
    pub trait Sealed {}

    impl Sealed for u8 {}
    impl Sealed for i8 {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
}

/// Runtime tag for the element types the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    I8,
    U32,
    I32,
    F32,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
        }
    }
}

/// Accumulator arithmetic.
///
/// Integer accumulators wrap on overflow in every operation, matching what
/// the SIMD kernels do in their native lane width.
pub trait Accumulator: sealed::Sealed + Copy + Send + Sync + PartialEq + Debug + 'static {
    const TYPE: ElementType;
    const ZERO: Self;
    const ONE: Self;

    fn acc_add(self, rhs: Self) -> Self;
    fn acc_mul(self, rhs: Self) -> Self;

    /// `self + a * b`
    #[inline(always)]
    fn acc_madd(self, a: Self, b: Self) -> Self {
        self.acc_add(a.acc_mul(b))
    }
}

/// An operand element type together with its accumulator and kernel table.
pub trait Operand: sealed::Sealed + Copy + Send + Sync + PartialEq + Debug + 'static {
    type Acc: Accumulator;

    const TYPE: ElementType;

    /// Additive identity, used to pad partial tiles.
    const ZERO: Self;

    /// Promotes an operand value into the accumulator domain.
    fn widen(self) -> Self::Acc;

    /// Kernel variants for this pair, in preference order for tie-breaks.
    fn kernels() -> &'static [KernelDescriptor<Self>];
}

impl Accumulator for u32 {
    const TYPE: ElementType = ElementType::U32;
    const ZERO: Self = 0;
    const ONE: Self = 1;

    #[inline(always)]
    fn acc_add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    #[inline(always)]
    fn acc_mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }
}

impl Accumulator for i32 {
    const TYPE: ElementType = ElementType::I32;
    const ZERO: Self = 0;
    const ONE: Self = 1;

    #[inline(always)]
    fn acc_add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    #[inline(always)]
    fn acc_mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }
}

impl Accumulator for f32 {
    const TYPE: ElementType = ElementType::F32;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline(always)]
    fn acc_add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline(always)]
    fn acc_mul(self, rhs: Self) -> Self {
        self * rhs
    }
}

impl Operand for u8 {
    type Acc = u32;
    const TYPE: ElementType = ElementType::U8;
    const ZERO: Self = 0;

    #[inline(always)]
    fn widen(self) -> u32 {
        self as u32
    }

    fn kernels() -> &'static [KernelDescriptor<u8>] {
        kernels::U8_KERNELS
    }
}

impl Operand for i8 {
    type Acc = i32;
    const TYPE: ElementType = ElementType::I8;
    const ZERO: Self = 0;

    #[inline(always)]
    fn widen(self) -> i32 {
        self as i32
    }

    fn kernels() -> &'static [KernelDescriptor<i8>] {
        kernels::I8_KERNELS
    }
}

impl Operand for f32 {
    type Acc = f32;
    const TYPE: ElementType = ElementType::F32;
    const ZERO: Self = 0.0;

    #[inline(always)]
    fn widen(self) -> f32 {
        self
    }

    fn kernels() -> &'static [KernelDescriptor<f32>] {
        kernels::F32_KERNELS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_accumulators_wrap() {
        assert_eq!(u32::MAX.acc_add(2), 1);
        assert_eq!(0x8000_0000u32.acc_mul(2), 0);
        assert_eq!(i32::MAX.acc_madd(1, 1), i32::MIN);
    }

    #[test]
    fn test_widen_preserves_sign() {
        assert_eq!((-128i8).widen(), -128i32);
        assert_eq!(255u8.widen(), 255u32);
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(<u8 as Operand>::TYPE.size(), 1);
        assert_eq!(<u32 as Accumulator>::TYPE.size(), 4);
        assert_eq!(<f32 as Operand>::TYPE.size(), 4);
    }
}
