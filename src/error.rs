//! Error types for GEMM construction and configuration.

use thiserror::Error;

use crate::element::ElementType;

/// Errors reported by [`make_gemm`](crate::make_gemm) and [`Gemm`](crate::Gemm).
///
/// Everything here is detected before any packing or kernel work starts.
/// A configured [`Gemm`](crate::Gemm) never fails during `run()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GemmError {
    /// One of M, N, K, batches or multis was zero.
    #[error("invalid dimension: {name} must be >= 1 (got {value})")]
    InvalidDimension { name: &'static str, value: usize },

    /// The kernel table for this type pair has no capability-free entry.
    #[error("no baseline kernel registered for {0:?}")]
    NoBaselineKernel(ElementType),

    /// A leading dimension or batch/multi stride is too small for the shape.
    #[error("invalid stride for {operand}: {what} is {value}, need at least {min}")]
    InvalidStride {
        operand: &'static str,
        what: &'static str,
        value: usize,
        min: usize,
    },

    /// The workspace is smaller than `required_workspace_size()`.
    #[error("workspace too small: need {required} bytes, got {actual}")]
    WorkspaceTooSmall { required: usize, actual: usize },

    /// An operand slice does not cover every element the strides address.
    #[error("operand {operand} too small: need {required} elements, got {actual}")]
    BufferTooSmall {
        operand: &'static str,
        required: usize,
        actual: usize,
    },

    /// Pretransposed B was supplied (or requested) against the handle's hint.
    #[error("pretransposed B mismatch: {0}")]
    PretransposedMismatch(&'static str),

    /// `run()` was called before `configure()`.
    #[error("gemm has not been configured with operand arrays")]
    NotConfigured,
}

/// Result type for GEMM operations.
pub type Result<T> = std::result::Result<T, GemmError>;
