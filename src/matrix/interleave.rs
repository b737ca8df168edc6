//! Packing transform: matrix block → kernel-interleaved tiles.
//!
//! Both operands share one layout. The "outer" axis is rows for A and
//! columns for B; `tile` is the kernel's height (A) or width (B). For each
//! tile, for each group of `k_unroll` depth positions, the tile's `tile`
//! outer indices are written in order, each carrying its `k_unroll` depth
//! values:
//!
//! ```text
//! tile t, group g:  [o0:k0 o0:k1 .. o1:k0 o1:k1 .. o(tile-1):k(u-1)]
//! ```
//!
//! Out-of-range outer indices and depth positions are written as zero, so a
//! partial tile behaves as a full tile padded with the additive identity.

use std::ops::Range;

use crate::element::Operand;
use crate::kernels::KernelDescriptor;
use crate::matrix::layout::MatrixView;

/// Packed depth of a block of `depth` K positions.
pub fn packed_depth(depth: usize, k_unroll: usize) -> usize {
    depth.next_multiple_of(k_unroll)
}

/// Number of elements [`interleave`] writes for an `outer × depth` block.
pub fn packed_len(outer: usize, depth: usize, tile: usize, k_unroll: usize) -> usize {
    outer.next_multiple_of(tile) * packed_depth(depth, k_unroll)
}

/// Interleaves `fetch(outer, depth)` over the given block into `out`.
///
/// Returns the number of elements written. `out` must hold at least
/// [`packed_len`] elements; nothing past that is touched.
pub fn interleave<T: Operand>(
    out: &mut [T],
    outer: Range<usize>,
    depth: Range<usize>,
    tile: usize,
    k_unroll: usize,
    fetch: impl Fn(usize, usize) -> T,
) -> usize {
    let len = packed_len(outer.len(), depth.len(), tile, k_unroll);
    let tile_len = tile * packed_depth(depth.len(), k_unroll);

    for (t, tile_out) in out[..len].chunks_exact_mut(tile_len).enumerate() {
        let base = outer.start + t * tile;
        let valid_outer = (outer.end - base).min(tile);

        for (g, group) in tile_out.chunks_exact_mut(tile * k_unroll).enumerate() {
            let k_base = depth.start + g * k_unroll;
            let valid_k = (depth.end - k_base).min(k_unroll);

            for (i, lane) in group.chunks_exact_mut(k_unroll).enumerate() {
                if i >= valid_outer {
                    lane.fill(T::ZERO);
                    continue;
                }
                for (q, slot) in lane.iter_mut().enumerate() {
                    *slot = if q < valid_k {
                        fetch(base + i, k_base + q)
                    } else {
                        T::ZERO
                    };
                }
            }
        }
    }

    len
}

/// Packs rows `rows` × depth `depth` of logical A (M×K).
pub fn pack_a<T: Operand>(
    a: &MatrixView<'_, T>,
    out: &mut [T],
    rows: Range<usize>,
    depth: Range<usize>,
    kernel: &KernelDescriptor<T>,
) -> usize {
    let (data, ld) = (a.data, a.ld);
    if a.transposed {
        interleave(out, rows, depth, kernel.out_height, kernel.k_unroll, |r, k| {
            data[k * ld + r]
        })
    } else {
        interleave(out, rows, depth, kernel.out_height, kernel.k_unroll, |r, k| {
            data[r * ld + k]
        })
    }
}

/// Packs depth `depth` × columns `cols` of logical B (K×N).
pub fn pack_b<T: Operand>(
    b: &MatrixView<'_, T>,
    out: &mut [T],
    cols: Range<usize>,
    depth: Range<usize>,
    kernel: &KernelDescriptor<T>,
) -> usize {
    let (data, ld) = (b.data, b.ld);
    if b.transposed {
        interleave(out, cols, depth, kernel.out_width, kernel.k_unroll, |c, k| {
            data[c * ld + k]
        })
    } else {
        interleave(out, cols, depth, kernel.out_width, kernel.k_unroll, |c, k| {
            data[k * ld + c]
        })
    }
}
