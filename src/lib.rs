//! Runtime-dispatched, cache-blocked GEMM over interleaved operand tiles.
//!
//! A [`CapabilitySet`] describes what the CPU can do. [`make_gemm`] uses it to
//! pick the widest micro-kernel registered for the operand type, sizes cache
//! blocks around that kernel, and hands back a [`Gemm`] you configure once
//! and run as often as you like. Operand blocks are repacked into the
//! kernel's interleaved tile layout on the fly, or once up front with
//! [`Gemm::pretranspose_b`].
//!
//! ## Usage
//!
//! ```
//! use interleaved_gemm::{CapabilitySet, GemmArgs, GemmArrays, MatrixMut, MatrixRef, make_gemm};
//!
//! let (m, n, k) = (12, 8, 16);
//! let a = vec![1u8; m * k];
//! let b = vec![2u8; k * n];
//! let mut c = vec![0u32; m * n];
//!
//! let caps = CapabilitySet::detect();
//! let mut gemm = make_gemm::<u8>(&caps, GemmArgs::new(m, n, k)).unwrap();
//! let mut workspace = vec![0u8; gemm.required_workspace_size()];
//!
//! let arrays = GemmArrays::new(MatrixRef::new(&a, k), MatrixRef::new(&b, n), MatrixMut::new(&mut c, n));
//! gemm.configure(arrays, &mut workspace).unwrap();
//! gemm.run().unwrap();
//! drop(gemm);
//!
//! assert!(c.iter().all(|&v| v == 32));
//! ```
//!
//! For one-off dense products there is a shortcut:
//!
//! ```
//! use interleaved_gemm::multiply;
//!
//! let a = vec![1.0f32; 64 * 64];
//! let b = vec![1.0f32; 64 * 64];
//! let mut c = vec![0.0f32; 64 * 64];
//!
//! multiply(&a, &b, &mut c, 64, 64, 64).unwrap();
//! assert_eq!(c[0], 64.0);
//! ```
//!
//! ## What's inside
//!
//! - u8→u32, i8→i32 and f32 kernels: 12×8 AVX2, 8×16 AVX-512, portable 4×4
//! - Cache blocking tuned from L1/L2 sizes, overridable per handle
//! - Batched and multi (independent B) problems with optional bias
//! - Scoped multi-threading over disjoint output blocks

pub mod blocked;
pub mod capability;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod kernels;
pub mod matrix;
pub mod threaded;

pub use blocked::blocking::{BlockingParams, CacheInfo, GemmConfig};
pub use capability::{CapabilitySet, CpuFeature};
pub use dispatch::{Gemm, GemmArgs, GemmArrays, OperandB, make_gemm};
pub use element::{Accumulator, ElementType, Operand};
pub use error::{GemmError, Result};
pub use kernels::KernelDescriptor;
pub use matrix::layout::{MatrixDescriptor, MatrixMut, MatrixRef};

/// Matrix multiply: C += A * B
///
/// Picks the fastest kernel your CPU supports. Matrices are dense row-major:
/// A is m×k, B is k×n, C is m×n.
pub fn multiply<T: Operand>(a: &[T], b: &[T], c: &mut [T::Acc], m: usize, n: usize, k: usize) -> Result<()> {
    multiply_parallel(a, b, c, m, n, k, 1)
}

/// Same as [`multiply`] but splits the output blocks over up to
/// `num_threads` threads (never more than the machine has).
pub fn multiply_parallel<T: Operand>(
    a: &[T],
    b: &[T],
    c: &mut [T::Acc],
    m: usize,
    n: usize,
    k: usize,
    num_threads: usize,
) -> Result<()> {
    let caps = CapabilitySet::detect();
    let args = GemmArgs::new(m, n, k)
        .with_beta(T::Acc::ONE)
        .with_max_threads(num_threads);

    let mut gemm = make_gemm::<T>(&caps, args)?;
    let mut workspace = vec![0u8; gemm.required_workspace_size()];
    let arrays = GemmArrays::new(MatrixRef::new(a, k), MatrixRef::new(b, n), MatrixMut::new(c, n));
    gemm.configure(arrays, &mut workspace)?;
    gemm.run()
}
