//! Problem descriptors and strided operand views.

use crate::element::ElementType;
use crate::error::{GemmError, Result};

/// Shape of one GEMM call.
///
/// `multis` independent problems each run `batches` products. Within a multi
/// every batch shares the same B; A and C vary per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixDescriptor {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batches: usize,
    pub multis: usize,
    /// A is stored as K×M.
    pub transpose_a: bool,
    /// B is stored as N×K.
    pub transpose_b: bool,
    pub element: ElementType,
}

impl MatrixDescriptor {
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("m", self.m),
            ("n", self.n),
            ("k", self.k),
            ("batches", self.batches),
            ("multis", self.multis),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(GemmError::InvalidDimension { name, value });
            }
        }
        Ok(())
    }

    /// Stored (rows, cols) of A for one batch.
    pub fn a_stored(&self) -> (usize, usize) {
        if self.transpose_a {
            (self.k, self.m)
        } else {
            (self.m, self.k)
        }
    }

    /// Stored (rows, cols) of B for one multi.
    pub fn b_stored(&self) -> (usize, usize) {
        if self.transpose_b {
            (self.n, self.k)
        } else {
            (self.k, self.n)
        }
    }
}

/// A read-only operand in caller memory.
///
/// `ld` is the distance between stored rows. Batch and multi strides default
/// to densely packed matrices when left as `None`.
#[derive(Debug, Clone, Copy)]
pub struct MatrixRef<'a, T> {
    pub data: &'a [T],
    pub ld: usize,
    pub batch_stride: Option<usize>,
    pub multi_stride: Option<usize>,
}

impl<'a, T> MatrixRef<'a, T> {
    pub fn new(data: &'a [T], ld: usize) -> Self {
        Self {
            data,
            ld,
            batch_stride: None,
            multi_stride: None,
        }
    }

    pub fn with_batch_stride(mut self, stride: usize) -> Self {
        self.batch_stride = Some(stride);
        self
    }

    pub fn with_multi_stride(mut self, stride: usize) -> Self {
        self.multi_stride = Some(stride);
        self
    }
}

/// The output operand in caller memory. Same stride rules as [`MatrixRef`].
#[derive(Debug)]
pub struct MatrixMut<'a, T> {
    pub data: &'a mut [T],
    pub ld: usize,
    pub batch_stride: Option<usize>,
    pub multi_stride: Option<usize>,
}

impl<'a, T> MatrixMut<'a, T> {
    pub fn new(data: &'a mut [T], ld: usize) -> Self {
        Self {
            data,
            ld,
            batch_stride: None,
            multi_stride: None,
        }
    }

    pub fn with_batch_stride(mut self, stride: usize) -> Self {
        self.batch_stride = Some(stride);
        self
    }

    pub fn with_multi_stride(mut self, stride: usize) -> Self {
        self.multi_stride = Some(stride);
        self
    }
}

/// Resolved element strides of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strides {
    pub ld: usize,
    pub batch: usize,
    pub multi: usize,
}

impl Strides {
    pub fn offset(&self, multi: usize, batch: usize) -> usize {
        multi * self.multi + batch * self.batch
    }
}

/// Validated stride request for one operand.
pub(crate) struct StrideCheck {
    pub operand: &'static str,
    pub rows: usize,
    pub cols: usize,
    pub batches: usize,
    pub multis: usize,
    /// Distinct (multi, batch) matrices must not overlap. Required for
    /// outputs, which are written concurrently.
    pub exclusive: bool,
}

impl StrideCheck {
    pub fn resolve(
        &self,
        len: usize,
        ld: usize,
        batch_stride: Option<usize>,
        multi_stride: Option<usize>,
    ) -> Result<Strides> {
        let span = (self.rows - 1) * ld + self.cols;
        if ld < self.cols {
            return Err(self.bad_stride("ld", ld, self.cols));
        }

        let batch = batch_stride.unwrap_or(self.rows * ld);
        if self.exclusive && self.batches > 1 && batch < span {
            return Err(self.bad_stride("batch stride", batch, span));
        }

        let batch_span = (self.batches - 1) * batch + span;
        let multi = multi_stride.unwrap_or(self.batches * batch);
        if self.exclusive && self.multis > 1 && multi < batch_span {
            return Err(self.bad_stride("multi stride", multi, batch_span));
        }

        let required = (self.multis - 1) * multi + batch_span;
        if len < required {
            return Err(GemmError::BufferTooSmall {
                operand: self.operand,
                required,
                actual: len,
            });
        }

        Ok(Strides { ld, batch, multi })
    }

    fn bad_stride(&self, what: &'static str, value: usize, min: usize) -> GemmError {
        GemmError::InvalidStride {
            operand: self.operand,
            what,
            value,
            min,
        }
    }
}

/// Logical view of one (possibly transposed) matrix.
///
/// `at(row, col)` addresses the logical matrix; when `transposed` is set the
/// data is stored with rows and columns swapped.
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a, T> {
    pub data: &'a [T],
    pub ld: usize,
    pub transposed: bool,
}

impl<'a, T: Copy> MatrixView<'a, T> {
    pub fn new(data: &'a [T], ld: usize, transposed: bool) -> Self {
        Self {
            data,
            ld,
            transposed,
        }
    }

    #[inline(always)]
    pub fn at(&self, row: usize, col: usize) -> T {
        if self.transposed {
            self.data[col * self.ld + row]
        } else {
            self.data[row * self.ld + col]
        }
    }
}
