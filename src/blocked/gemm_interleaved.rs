//! Blocked/interleaved GEMM driver.
//!
//! The output of every (multi, batch) problem is cut into `m_block × n_block`
//! blocks. A block is one unit of work: for each K-block the driver packs the
//! A rows and B columns it needs, runs the kernel over every tile into a
//! private accumulator, and merges the accumulator into C. Units are
//! independent, so workers only ever share read-only operands.

use std::ops::Range;

use crate::blocked::blocking::BlockingParams;
use crate::blocked::workspace::Scratch;
use crate::element::{Accumulator, Operand};
use crate::kernels::KernelDescriptor;
use crate::matrix::interleave::{pack_a, pack_b, packed_depth, packed_len};
use crate::matrix::layout::{MatrixDescriptor, MatrixView, Strides};

/// Kernel, shape and blocking of one GEMM handle.
#[derive(Debug)]
pub struct GemmInterleaved<T: Operand> {
    pub kernel: &'static KernelDescriptor<T>,
    pub shape: MatrixDescriptor,
    pub blocking: BlockingParams,
}

impl<T: Operand> Clone for GemmInterleaved<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Operand> Copy for GemmInterleaved<T> {}

/// Coordinates of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub multi: usize,
    pub batch: usize,
    pub m_block: usize,
    pub n_block: usize,
}

/// The flattened `(multi, batch, m_block, n_block)` iteration space,
/// `n_block` fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkGrid {
    pub multis: usize,
    pub batches: usize,
    pub m_blocks: usize,
    pub n_blocks: usize,
}

impl WorkGrid {
    pub fn total(&self) -> usize {
        self.multis * self.batches * self.m_blocks * self.n_blocks
    }

    pub fn unit(&self, index: usize) -> WorkUnit {
        let n_block = index % self.n_blocks;
        let rest = index / self.n_blocks;
        let m_block = rest % self.m_blocks;
        let rest = rest / self.m_blocks;
        WorkUnit {
            multi: rest / self.batches,
            batch: rest % self.batches,
            m_block,
            n_block,
        }
    }
}

/// Where the packed B tiles come from during a run.
#[derive(Debug, Clone, Copy)]
pub enum BSource<'a, T> {
    /// Caller layout, packed per K-block by each worker.
    Raw { data: &'a [T], strides: Strides },
    /// Already in the order [`GemmInterleaved::pretranspose_b`] writes.
    Pretransposed(&'a [T]),
}

/// Raw handle to the output that workers write disjoint blocks through.
#[derive(Debug, Clone, Copy)]
pub struct OutputPtr<A> {
    ptr: *mut A,
    len: usize,
}

// SAFETY: the pointer is only dereferenced through `row_mut`, whose callers
// guarantee that no two threads touch the same elements.
unsafe impl<A: Send> Send for OutputPtr<A> {}
unsafe impl<A: Send> Sync for OutputPtr<A> {}

impl<A> OutputPtr<A> {
    pub fn new(data: &mut [A]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        }
    }

    /// # Safety
    ///
    /// `start..start + len` must not be accessed through any other reference
    /// while the returned slice is alive, and the slice the pointer came
    /// from must outlive it.
    #[allow(clippy::mut_from_ref)]
    unsafe fn row_mut<'s>(&self, start: usize, len: usize) -> &'s mut [A] {
        assert!(start + len <= self.len, "output row out of bounds");
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), len) }
    }
}

/// Everything the workers of one run read.
pub struct RunPlan<'a, T: Operand> {
    pub driver: &'a GemmInterleaved<T>,
    pub alpha: T::Acc,
    pub beta: T::Acc,
    pub a: &'a [T],
    pub a_strides: Strides,
    pub b: BSource<'a, T>,
    /// `n` values per multi.
    pub bias: Option<&'a [T::Acc]>,
    pub c: OutputPtr<T::Acc>,
    pub c_strides: Strides,
}

impl<T: Operand> GemmInterleaved<T> {
    pub fn grid(&self) -> WorkGrid {
        WorkGrid {
            multis: self.shape.multis,
            batches: self.shape.batches,
            m_blocks: self.blocking.m_blocks(self.shape.m),
            n_blocks: self.blocking.n_blocks(self.shape.n),
        }
    }

    fn rows(&self, m_block: usize) -> Range<usize> {
        let start = m_block * self.blocking.m_block;
        start..(start + self.blocking.m_block).min(self.shape.m)
    }

    fn cols(&self, n_block: usize) -> Range<usize> {
        let start = n_block * self.blocking.n_block;
        start..(start + self.blocking.n_block).min(self.shape.n)
    }

    fn depth(&self, k_block: usize) -> Range<usize> {
        let start = k_block * self.blocking.k_block;
        start..(start + self.blocking.k_block).min(self.shape.k)
    }

    /// Elements of the whole pretransposed B (every multi).
    pub fn pretransposed_len(&self) -> usize {
        self.shape.multis * self.pretransposed_multi_len()
    }

    fn pretransposed_multi_len(&self) -> usize {
        let kernel = self.kernel;
        self.shape.k.next_multiple_of(kernel.k_unroll) * self.shape.n.next_multiple_of(kernel.out_width)
    }

    /// Start of the packed `(k_block, n_block)` B block of `multi`.
    ///
    /// Layout is multi → K-block → N-block. Every K-block but the last has
    /// `k_block` packed depth and every N-block but the last is `n_block`
    /// wide, so prefixes are plain products.
    fn pretransposed_offset(&self, multi: usize, k_block: usize, n_block: usize) -> usize {
        let kernel = self.kernel;
        let n_padded = self.shape.n.next_multiple_of(kernel.out_width);
        let depth = packed_depth(self.depth(k_block).len(), kernel.k_unroll);

        multi * self.pretransposed_multi_len()
            + k_block * self.blocking.k_block * n_padded
            + depth * n_block * self.blocking.n_block
    }

    /// Packs all of B into `out` in the order runs consume it.
    pub fn pretranspose_b(&self, b: &[T], strides: Strides, out: &mut [T]) {
        let grid = self.grid();
        for multi in 0..self.shape.multis {
            let view = MatrixView::new(&b[strides.offset(multi, 0)..], strides.ld, self.shape.transpose_b);
            for k_block in 0..self.blocking.k_blocks(self.shape.k) {
                for n_block in 0..grid.n_blocks {
                    let start = self.pretransposed_offset(multi, k_block, n_block);
                    pack_b(
                        &view,
                        &mut out[start..],
                        self.cols(n_block),
                        self.depth(k_block),
                        self.kernel,
                    );
                }
            }
        }
    }
}

impl<T: Operand> RunPlan<'_, T> {
    /// Runs the units `units` of the work grid with one worker's scratch.
    pub fn execute(&self, units: Range<usize>, scratch: Scratch<'_, T>) {
        let driver = self.driver;
        let kernel = driver.kernel;
        let shape = &driver.shape;
        let (mr, nr, ku) = (kernel.out_height, kernel.out_width, kernel.k_unroll);
        let grid = driver.grid();
        let k_blocks = driver.blocking.k_blocks(shape.k);
        let Scratch {
            a_panel,
            b_panel,
            acc,
        } = scratch;

        // With a single K-block, consecutive units of the same row block can
        // reuse the packed A panel.
        let mut packed_rows: Option<(usize, usize, usize)> = None;

        for index in units {
            let unit = grid.unit(index);
            let rows = driver.rows(unit.m_block);
            let cols = driver.cols(unit.n_block);
            let rows_padded = rows.len().next_multiple_of(mr);
            let cols_padded = cols.len().next_multiple_of(nr);

            let a_view = MatrixView::new(
                &self.a[self.a_strides.offset(unit.multi, unit.batch)..],
                self.a_strides.ld,
                shape.transpose_a,
            );

            for k_block in 0..k_blocks {
                let depth = driver.depth(k_block);
                let kc = packed_depth(depth.len(), ku);

                let row_key = (unit.multi, unit.batch, unit.m_block);
                if k_blocks > 1 || packed_rows != Some(row_key) {
                    pack_a(&a_view, a_panel, rows.clone(), depth.clone(), kernel);
                    packed_rows = Some(row_key);
                }

                let b_tiles: &[T] = match self.b {
                    BSource::Raw { data, strides } => {
                        let view = MatrixView::new(
                            &data[strides.offset(unit.multi, 0)..],
                            strides.ld,
                            shape.transpose_b,
                        );
                        let len = pack_b(&view, b_panel, cols.clone(), depth.clone(), kernel);
                        &b_panel[..len]
                    }
                    BSource::Pretransposed(packed) => {
                        let start = driver.pretransposed_offset(unit.multi, k_block, unit.n_block);
                        &packed[start..start + packed_len(cols.len(), depth.len(), nr, ku)]
                    }
                };

                let ldc = cols_padded;
                let block = &mut acc[..rows_padded * cols_padded];
                block.fill(T::Acc::ZERO);

                for tj in 0..cols_padded / nr {
                    let b_tile = &b_tiles[tj * nr * kc..(tj + 1) * nr * kc];
                    for ti in 0..rows_padded / mr {
                        let a_tile = &a_panel[ti * mr * kc..(ti + 1) * mr * kc];
                        let c_tile = &mut block[ti * mr * ldc + tj * nr..];

                        // SAFETY: the tiles hold exactly `mr * kc` and
                        // `nr * kc` packed values, `c_tile` covers `mr` rows of
                        // stride `ldc` with `nr` columns each, and the kernel
                        // was selected against a capability set that vouches
                        // for its CPU features.
                        unsafe {
                            (kernel.kernel)(a_tile.as_ptr(), b_tile.as_ptr(), c_tile.as_mut_ptr(), kc, ldc);
                        }
                    }
                }

                self.merge(unit, rows.clone(), cols.clone(), block, ldc, k_block == 0);
            }
        }
    }

    /// Folds one K-block's products into C.
    ///
    /// The first K-block applies `alpha·acc + beta·C + bias`; later ones add
    /// `alpha·acc`. A zero `beta` never reads the prior output.
    fn merge(
        &self,
        unit: WorkUnit,
        rows: Range<usize>,
        cols: Range<usize>,
        acc: &[T::Acc],
        ldc: usize,
        first: bool,
    ) {
        let zero = T::Acc::ZERO;
        let n = self.driver.shape.n;
        let base = self.c_strides.offset(unit.multi, unit.batch);
        let bias = self.bias.map(|b| &b[unit.multi * n..(unit.multi + 1) * n]);

        for (i, row) in rows.enumerate() {
            let acc_row = &acc[i * ldc..i * ldc + cols.len()];
            // SAFETY: each (multi, batch, row, col) belongs to exactly one work
            // unit and each unit to one worker. Configuration checked that the
            // strides keep distinct matrices apart and inside the output.
            let out = unsafe {
                self.c
                    .row_mut(base + row * self.c_strides.ld + cols.start, cols.len())
            };

            for ((dst, &sum), col) in out.iter_mut().zip(acc_row).zip(cols.clone()) {
                let scaled = self.alpha.acc_mul(sum);
                *dst = if first {
                    let prior = if self.beta == zero {
                        zero
                    } else {
                        self.beta.acc_mul(*dst)
                    };
                    let offset = bias.map_or(zero, |b| b[col]);
                    scaled.acc_add(prior).acc_add(offset)
                } else {
                    dst.acc_add(scaled)
                };
            }
        }
    }
}
