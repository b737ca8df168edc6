//! The dispatcher and the GEMM handle it builds.
//!
//! [`make_gemm`] picks the widest kernel the capability set allows, sizes the
//! cache blocks and the per-thread scratch, and returns a [`Gemm`]. The handle
//! is then bound to operand arrays and a workspace with [`Gemm::configure`]
//! and executed with [`Gemm::run`], as many times as needed.

use crate::blocked::blocking::{BlockingParams, GemmConfig};
use crate::blocked::gemm_interleaved::{BSource, GemmInterleaved, OutputPtr, RunPlan};
use crate::blocked::workspace::ScratchLayout;
use crate::capability::CapabilitySet;
use crate::element::{Accumulator, Operand};
use crate::error::{GemmError, Result};
use crate::kernels::{KernelDescriptor, select_kernel};
use crate::matrix::layout::{MatrixDescriptor, MatrixMut, MatrixRef, StrideCheck, Strides};
use crate::threaded::scheduler::{choose_thread_count, run_partitioned};

/// Construction arguments for [`make_gemm`].
///
/// Defaults describe one dense `C = A·B`: a single batch and multi, no
/// transposes, `alpha = 1`, `beta = 0`, one thread, B in caller layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmArgs<A> {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batches: usize,
    pub multis: usize,
    pub transpose_a: bool,
    pub transpose_b: bool,
    pub alpha: A,
    pub beta: A,
    pub max_threads: usize,
    /// B will be supplied already packed by [`Gemm::pretranspose_b`].
    pub pretransposed_hint: bool,
    pub config: GemmConfig,
}

impl<A: Accumulator> GemmArgs<A> {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            batches: 1,
            multis: 1,
            transpose_a: false,
            transpose_b: false,
            alpha: A::ONE,
            beta: A::ZERO,
            max_threads: 1,
            pretransposed_hint: false,
            config: GemmConfig::default(),
        }
    }

    pub fn with_batches(mut self, batches: usize) -> Self {
        self.batches = batches;
        self
    }

    pub fn with_multis(mut self, multis: usize) -> Self {
        self.multis = multis;
        self
    }

    pub fn with_transpose_a(mut self, transpose: bool) -> Self {
        self.transpose_a = transpose;
        self
    }

    pub fn with_transpose_b(mut self, transpose: bool) -> Self {
        self.transpose_b = transpose;
        self
    }

    pub fn with_alpha(mut self, alpha: A) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: A) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_pretransposed_b(mut self, hint: bool) -> Self {
        self.pretransposed_hint = hint;
        self
    }

    pub fn with_config(mut self, config: GemmConfig) -> Self {
        self.config = config;
        self
    }
}

/// The B operand as handed to [`Gemm::configure`].
#[derive(Debug, Clone, Copy)]
pub enum OperandB<'a, T> {
    /// Caller layout. Any batch stride is ignored: B is shared by every batch
    /// of a multi.
    Raw(MatrixRef<'a, T>),
    /// Output of [`Gemm::pretranspose_b`]. Requires the pretransposed hint.
    Pretransposed(&'a [T]),
}

impl<'a, T> From<MatrixRef<'a, T>> for OperandB<'a, T> {
    fn from(b: MatrixRef<'a, T>) -> Self {
        OperandB::Raw(b)
    }
}

/// Operand arrays bound to a handle by [`Gemm::configure`].
#[derive(Debug)]
pub struct GemmArrays<'a, T: Operand> {
    pub a: MatrixRef<'a, T>,
    pub b: OperandB<'a, T>,
    /// `n` values per multi, added to every row of every batch.
    pub bias: Option<&'a [T::Acc]>,
    pub c: MatrixMut<'a, T::Acc>,
}

impl<'a, T: Operand> GemmArrays<'a, T> {
    pub fn new(a: MatrixRef<'a, T>, b: impl Into<OperandB<'a, T>>, c: MatrixMut<'a, T::Acc>) -> Self {
        Self {
            a,
            b: b.into(),
            bias: None,
            c,
        }
    }

    pub fn with_bias(mut self, bias: &'a [T::Acc]) -> Self {
        self.bias = Some(bias);
        self
    }
}

/// Validated arrays and workspace a handle runs against.
struct GemmContext<'a, T: Operand> {
    a: &'a [T],
    a_strides: Strides,
    b: BSource<'a, T>,
    bias: Option<&'a [T::Acc]>,
    c: &'a mut [T::Acc],
    c_strides: Strides,
    workspace: &'a mut [u8],
}

/// A configured-once, run-many GEMM handle.
///
/// Computes, for every multi `q` and batch `p`,
/// `C[q,p] = alpha·A[q,p]·B[q] + beta·C[q,p] + bias[q]`.
pub struct Gemm<'a, T: Operand> {
    driver: GemmInterleaved<T>,
    alpha: T::Acc,
    beta: T::Acc,
    pretransposed_hint: bool,
    threads: usize,
    scratch: ScratchLayout,
    context: Option<GemmContext<'a, T>>,
}

/// Builds a GEMM handle for the operand type `T`.
///
/// Selects the largest-tile kernel whose required features are all in
/// `caps`, falling back to the portable baseline. Fails on a zero dimension
/// or a kernel table without a baseline; capability gaps never fail.
pub fn make_gemm<'a, T: Operand>(caps: &CapabilitySet, args: GemmArgs<T::Acc>) -> Result<Gemm<'a, T>> {
    let shape = MatrixDescriptor {
        m: args.m,
        n: args.n,
        k: args.k,
        batches: args.batches,
        multis: args.multis,
        transpose_a: args.transpose_a,
        transpose_b: args.transpose_b,
        element: T::TYPE,
    };
    shape.validate()?;

    let kernel = select_kernel(T::kernels(), caps)?;
    let threads = choose_thread_count(args.max_threads);
    // Every (multi, batch) problem already gives each worker a unit.
    let workers = threads.div_ceil(shape.batches * shape.multis);
    let blocking = BlockingParams::new(kernel, shape.m, shape.n, shape.k, workers, &args.config);
    let scratch = ScratchLayout::new(kernel, &blocking, args.pretransposed_hint);

    log::debug!(
        "gemm {:?} {}x{}x{} (batches {}, multis {}) -> {} on up to {} threads",
        T::TYPE,
        shape.m,
        shape.n,
        shape.k,
        shape.batches,
        shape.multis,
        kernel.name,
        threads
    );

    Ok(Gemm {
        driver: GemmInterleaved {
            kernel,
            shape,
            blocking,
        },
        alpha: args.alpha,
        beta: args.beta,
        pretransposed_hint: args.pretransposed_hint,
        threads,
        scratch,
        context: None,
    })
}

impl<'a, T: Operand> Gemm<'a, T> {
    /// The kernel variant this handle runs.
    pub fn kernel(&self) -> &'static KernelDescriptor<T> {
        self.driver.kernel
    }

    pub fn descriptor(&self) -> MatrixDescriptor {
        self.driver.shape
    }

    pub fn blocking(&self) -> BlockingParams {
        self.driver.blocking
    }

    /// Threads the workspace is sized for.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Workspace bytes [`configure`](Self::configure) expects.
    pub fn required_workspace_size(&self) -> usize {
        self.threads * self.scratch.bytes_per_thread::<T>()
    }

    /// Elements of `T` [`pretranspose_b`](Self::pretranspose_b) writes.
    pub fn pretransposed_b_size(&self) -> usize {
        self.driver.pretransposed_len()
    }

    /// Packs B for every multi into the layout runs consume directly.
    ///
    /// The result can be reused by any number of runs of this handle, or of
    /// handles with the same shape, kernel and blocking.
    pub fn pretranspose_b(&self, b: MatrixRef<'_, T>, out: &mut [T]) -> Result<()> {
        let strides = self.b_strides(&b)?;
        let required = self.pretransposed_b_size();
        if out.len() < required {
            return Err(GemmError::BufferTooSmall {
                operand: "pretransposed b",
                required,
                actual: out.len(),
            });
        }

        self.driver.pretranspose_b(b.data, strides, out);
        Ok(())
    }

    /// Binds operand arrays and workspace, replacing any earlier binding.
    ///
    /// Every operand is checked against the shape here so that
    /// [`run`](Self::run) cannot fail.
    pub fn configure(&mut self, arrays: GemmArrays<'a, T>, workspace: &'a mut [u8]) -> Result<()> {
        let shape = self.driver.shape;

        let required = self.required_workspace_size();
        if workspace.len() < required {
            return Err(GemmError::WorkspaceTooSmall {
                required,
                actual: workspace.len(),
            });
        }

        let (a_rows, a_cols) = shape.a_stored();
        let a = arrays.a;
        let a_strides = StrideCheck {
            operand: "a",
            rows: a_rows,
            cols: a_cols,
            batches: shape.batches,
            multis: shape.multis,
            exclusive: false,
        }
        .resolve(a.data.len(), a.ld, a.batch_stride, a.multi_stride)?;

        let b = match arrays.b {
            OperandB::Raw(_) if self.pretransposed_hint => {
                return Err(GemmError::PretransposedMismatch(
                    "handle expects pretransposed B but got caller layout",
                ));
            }
            OperandB::Raw(b) => BSource::Raw {
                data: b.data,
                strides: self.b_strides(&b)?,
            },
            OperandB::Pretransposed(_) if !self.pretransposed_hint => {
                return Err(GemmError::PretransposedMismatch(
                    "pretransposed B given to a handle built without the hint",
                ));
            }
            OperandB::Pretransposed(packed) => {
                let required = self.pretransposed_b_size();
                if packed.len() < required {
                    return Err(GemmError::BufferTooSmall {
                        operand: "pretransposed b",
                        required,
                        actual: packed.len(),
                    });
                }
                BSource::Pretransposed(packed)
            }
        };

        if let Some(bias) = arrays.bias {
            let required = shape.multis * shape.n;
            if bias.len() < required {
                return Err(GemmError::BufferTooSmall {
                    operand: "bias",
                    required,
                    actual: bias.len(),
                });
            }
        }

        let c = arrays.c;
        let c_strides = StrideCheck {
            operand: "c",
            rows: shape.m,
            cols: shape.n,
            batches: shape.batches,
            multis: shape.multis,
            exclusive: true,
        }
        .resolve(c.data.len(), c.ld, c.batch_stride, c.multi_stride)?;

        self.context = Some(GemmContext {
            a: a.data,
            a_strides,
            b,
            bias: arrays.bias,
            c: c.data,
            c_strides,
            workspace,
        });
        Ok(())
    }

    /// Executes the configured multiply, blocking until every thread is done.
    pub fn run(&mut self) -> Result<()> {
        let context = self.context.as_mut().ok_or(GemmError::NotConfigured)?;

        let plan = RunPlan {
            driver: &self.driver,
            alpha: self.alpha,
            beta: self.beta,
            a: context.a,
            a_strides: context.a_strides,
            b: context.b,
            bias: context.bias,
            c: OutputPtr::new(context.c),
            c_strides: context.c_strides,
        };
        let scratch = self.scratch;
        let per_thread = scratch.bytes_per_thread::<T>();

        run_partitioned(
            self.driver.grid().total(),
            self.threads,
            context.workspace,
            per_thread,
            |units, bytes| plan.execute(units, scratch.carve(bytes)),
        );
        Ok(())
    }

    fn b_strides(&self, b: &MatrixRef<'_, T>) -> Result<Strides> {
        let shape = self.driver.shape;
        let (rows, cols) = shape.b_stored();
        StrideCheck {
            operand: "b",
            rows,
            cols,
            batches: 1,
            multis: shape.multis,
            exclusive: false,
        }
        .resolve(b.data.len(), b.ld, None, b.multi_stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CpuFeature;

    #[test]
    fn test_zero_dimension_fails_construction() {
        let err = make_gemm::<u8>(&CapabilitySet::baseline(), GemmArgs::new(4, 4, 0)).err();
        assert_eq!(err, Some(GemmError::InvalidDimension { name: "k", value: 0 }));
    }

    #[test]
    fn test_baseline_caps_pick_portable_kernel() {
        let gemm = make_gemm::<i8>(&CapabilitySet::baseline(), GemmArgs::new(16, 16, 16)).unwrap();
        assert!(gemm.kernel().is_baseline());
        assert_eq!(gemm.threads(), 1);
    }

    #[test]
    fn test_assumed_caps_pick_wide_kernel_without_running() {
        // Selection only; nothing is executed, so the promise is never relied on.
        let caps = unsafe { CapabilitySet::assume(&[CpuFeature::Avx2, CpuFeature::Fma]) };
        let gemm = make_gemm::<f32>(&caps, GemmArgs::new(64, 64, 64)).unwrap();
        if cfg!(target_arch = "x86_64") {
            assert_eq!((gemm.kernel().out_height, gemm.kernel().out_width), (12, 8));
        } else {
            assert!(gemm.kernel().is_baseline());
        }
    }

    #[test]
    fn test_run_before_configure() {
        let mut gemm = make_gemm::<u8>(&CapabilitySet::baseline(), GemmArgs::new(2, 2, 2)).unwrap();
        assert_eq!(gemm.run(), Err(GemmError::NotConfigured));
    }

    #[test]
    fn test_workspace_scales_with_threads() {
        let caps = CapabilitySet::baseline();
        let one = make_gemm::<f32>(&caps, GemmArgs::new(32, 32, 32)).unwrap();
        let many = make_gemm::<f32>(&caps, GemmArgs::new(32, 32, 32).with_max_threads(usize::MAX)).unwrap();
        assert_eq!(
            many.required_workspace_size(),
            many.threads() * one.required_workspace_size()
        );
    }

    #[test]
    fn test_default_blocking_feeds_every_thread() {
        let caps = CapabilitySet::detect();
        let gemm = make_gemm::<u8>(&caps, GemmArgs::new(256, 256, 256).with_max_threads(8)).unwrap();
        assert!(gemm.driver.grid().total() >= gemm.threads());

        // Handles planned for more threads than the host has still split.
        let kernel = gemm.kernel();
        let blocking = BlockingParams::new(kernel, 256, 256, 256, 8, &GemmConfig::default());
        let driver = GemmInterleaved {
            kernel,
            shape: gemm.descriptor(),
            blocking,
        };
        assert!(driver.grid().total() >= 8);

        let batched = make_gemm::<u8>(
            &caps,
            GemmArgs::new(256, 256, 256).with_batches(4).with_max_threads(8),
        )
        .unwrap();
        assert!(batched.driver.grid().total() >= batched.threads());
    }

    #[test]
    fn test_small_k_keeps_workspace_bounded() {
        let caps = CapabilitySet::detect();
        let gemm = make_gemm::<u8>(&caps, GemmArgs::new(2048, 2048, 8)).unwrap();
        let l2 = GemmConfig::default().cache.l2_bytes;
        assert!(gemm.required_workspace_size() <= l2, "{:?}", gemm.blocking());
    }

    #[test]
    fn test_configure_rejects_small_workspace() {
        let a = [1u8; 4];
        let b = [1u8; 4];
        let mut c = [0u32; 4];
        let mut gemm = make_gemm::<u8>(&CapabilitySet::baseline(), GemmArgs::new(2, 2, 2)).unwrap();
        let mut workspace = vec![0u8; gemm.required_workspace_size() - 1];

        let arrays = GemmArrays::new(MatrixRef::new(&a, 2), MatrixRef::new(&b, 2), MatrixMut::new(&mut c, 2));
        let err = gemm.configure(arrays, &mut workspace).unwrap_err();
        assert!(matches!(err, GemmError::WorkspaceTooSmall { .. }));
    }

    #[test]
    fn test_pretransposed_hint_must_match() {
        let a = [1u8; 4];
        let b = [1u8; 4];
        let mut c = [0u32; 4];
        let mut gemm = make_gemm::<u8>(
            &CapabilitySet::baseline(),
            GemmArgs::new(2, 2, 2).with_pretransposed_b(true),
        )
        .unwrap();
        let mut workspace = vec![0u8; gemm.required_workspace_size()];

        let arrays = GemmArrays::new(MatrixRef::new(&a, 2), MatrixRef::new(&b, 2), MatrixMut::new(&mut c, 2));
        assert!(matches!(
            gemm.configure(arrays, &mut workspace),
            Err(GemmError::PretransposedMismatch(_))
        ));
    }

    #[test]
    fn test_bias_too_short() {
        let a = [1u8; 4];
        let b = [1u8; 4];
        let bias = [1u32];
        let mut c = [0u32; 4];
        let mut gemm = make_gemm::<u8>(&CapabilitySet::baseline(), GemmArgs::new(2, 2, 2)).unwrap();
        let mut workspace = vec![0u8; gemm.required_workspace_size()];

        let arrays = GemmArrays::new(MatrixRef::new(&a, 2), MatrixRef::new(&b, 2), MatrixMut::new(&mut c, 2))
            .with_bias(&bias);
        assert_eq!(
            gemm.configure(arrays, &mut workspace),
            Err(GemmError::BufferTooSmall {
                operand: "bias",
                required: 2,
                actual: 1
            })
        );
    }
}
