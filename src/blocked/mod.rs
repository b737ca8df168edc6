//! Cache-blocked GEMM driver.
//!
//! The driver breaks each problem into K, N and M blocks sized for L1/L2,
//! packs the operand blocks into the selected kernel's interleaved layout,
//! then calls the micro-kernel for every output tile.
//!
//! - `blocking`: block sizes derived from cache sizes and kernel geometry
//! - `workspace`: per-thread scratch carved from caller-provided bytes
//! - `gemm_interleaved`: the work grid and the per-thread block loop

pub mod blocking;
pub(crate) mod gemm_interleaved;
pub mod workspace;
