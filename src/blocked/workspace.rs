//! Per-thread scratch carved out of the caller's workspace bytes.

use std::mem::{align_of, size_of};

use crate::blocked::blocking::BlockingParams;
use crate::element::Operand;
use crate::kernels::KernelDescriptor;
use crate::matrix::interleave::packed_len;

/// Each region starts on its own cache line.
const REGION_ALIGN: usize = 64;

/// Element counts of the three scratch regions one worker needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchLayout {
    /// Packed A block: `m_block × k_block`, tile padded.
    pub a_elems: usize,
    /// Packed B block: `k_block × n_block`, tile padded. Zero when B arrives
    /// pretransposed.
    pub b_elems: usize,
    /// Accumulators for one `m_block × n_block` output block.
    pub acc_elems: usize,
}

impl ScratchLayout {
    pub fn new<T: Operand>(
        kernel: &KernelDescriptor<T>,
        blocking: &BlockingParams,
        pretransposed_b: bool,
    ) -> Self {
        let a_elems = packed_len(blocking.m_block, blocking.k_block, kernel.out_height, kernel.k_unroll);
        let b_elems = if pretransposed_b {
            0
        } else {
            packed_len(blocking.n_block, blocking.k_block, kernel.out_width, kernel.k_unroll)
        };
        let acc_elems = blocking.m_block * blocking.n_block;

        Self {
            a_elems,
            b_elems,
            acc_elems,
        }
    }

    /// Bytes one worker needs, alignment slack included.
    pub fn bytes_per_thread<T: Operand>(&self) -> usize {
        let a = self.a_elems * size_of::<T>();
        let b = self.b_elems * size_of::<T>();
        let acc = self.acc_elems * size_of::<T::Acc>();
        a.next_multiple_of(REGION_ALIGN)
            + b.next_multiple_of(REGION_ALIGN)
            + acc.next_multiple_of(REGION_ALIGN)
            + REGION_ALIGN
    }

    /// Splits one worker's byte range into typed regions.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`Self::bytes_per_thread`].
    pub fn carve<'w, T: Operand>(&self, bytes: &'w mut [u8]) -> Scratch<'w, T> {
        assert!(bytes.len() >= self.bytes_per_thread::<T>());

        let (a_panel, rest) = take::<T>(bytes, self.a_elems);
        let (b_panel, rest) = take::<T>(rest, self.b_elems);
        let (acc, _) = take::<T::Acc>(rest, self.acc_elems);

        Scratch {
            a_panel,
            b_panel,
            acc,
        }
    }
}

/// One worker's typed scratch.
pub struct Scratch<'w, T: Operand> {
    pub a_panel: &'w mut [T],
    pub b_panel: &'w mut [T],
    pub acc: &'w mut [T::Acc],
}

/// Takes `count` elements of `U` from the front of `bytes`, aligned to
/// [`REGION_ALIGN`], and returns them with the remaining bytes.
fn take<U: Copy>(bytes: &mut [u8], count: usize) -> (&mut [U], &mut [u8]) {
    debug_assert!(REGION_ALIGN % align_of::<U>() == 0);

    let addr = bytes.as_ptr() as usize;
    let pad = addr.next_multiple_of(REGION_ALIGN) - addr;
    let len = (count * size_of::<U>()).next_multiple_of(REGION_ALIGN);
    let (region, rest) = bytes[pad..].split_at_mut(len);

    // SAFETY: `region` is at least `count * size_of::<U>()` bytes, starts on a
    // REGION_ALIGN boundary (a multiple of U's alignment) and is exclusively
    // borrowed for the returned lifetime. `U` is one of the sealed element
    // types, all of which are valid for every bit pattern, and the bytes are
    // initialised because they come from a `&mut [u8]`.
    let typed = unsafe { std::slice::from_raw_parts_mut(region.as_mut_ptr() as *mut U, count) };
    (typed, rest)
}
