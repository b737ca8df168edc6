//! Cache blocking sizes.

use crate::element::{Accumulator, Operand};
use crate::kernels::KernelDescriptor;

/// Cache capacities the default block sizes are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub l1_bytes: usize,
    pub l2_bytes: usize,
}

impl Default for CacheInfo {
    fn default() -> Self {
        Self {
            l1_bytes: 32 * 1024,
            l2_bytes: 512 * 1024,
        }
    }
}

/// Tunables for the blocked driver.
///
/// Any explicit block size overrides the cache-derived default; it is still
/// rounded up to the kernel's granularity and capped at the problem size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GemmConfig {
    pub cache: CacheInfo,
    pub k_block: Option<usize>,
    pub n_block: Option<usize>,
    pub m_block: Option<usize>,
}

impl GemmConfig {
    pub fn with_cache(mut self, cache: CacheInfo) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_k_block(mut self, k_block: usize) -> Self {
        self.k_block = Some(k_block);
        self
    }

    pub fn with_n_block(mut self, n_block: usize) -> Self {
        self.n_block = Some(n_block);
        self
    }

    pub fn with_m_block(mut self, m_block: usize) -> Self {
        self.m_block = Some(m_block);
        self
    }
}

/// Resolved block sizes for one GEMM handle.
///
/// `k_block` is a multiple of the kernel's `k_unroll`, `n_block` of its
/// `out_width` and `m_block` of its `out_height`, so every block but the
/// last along each axis is made of whole tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingParams {
    pub k_block: usize,
    pub n_block: usize,
    pub m_block: usize,
}

impl BlockingParams {
    /// Block sizes for one `m × n × k` problem that should keep `workers`
    /// threads busy.
    ///
    /// Defaults are derived from the cache sizes, then the output block is
    /// kept within half of L2 and, where M and N allow it, split into at
    /// least `workers` blocks. Explicit overrides are never split.
    pub fn new<T: Operand>(
        kernel: &KernelDescriptor<T>,
        m: usize,
        n: usize,
        k: usize,
        workers: usize,
        config: &GemmConfig,
    ) -> Self {
        let elem = T::TYPE.size();
        let acc = <T::Acc as Accumulator>::TYPE.size();
        let (mr, nr, ku) = (kernel.out_height, kernel.out_width, kernel.k_unroll);
        let cache = config.cache;
        let acc_budget = cache.l2_bytes / 2;

        // A and B slivers for one tile share half of L1.
        let k_block = match config.k_block {
            Some(kb) => kb.max(1).next_multiple_of(ku),
            None => {
                let raw = (cache.l1_bytes / 2) / (elem * mr.max(nr));
                balance(k, round_down(raw, ku).max(ku), ku)
            }
        }
        .min(k.next_multiple_of(ku));

        // The packed B block fills most of L2 next to one A sliver, and one
        // tile row of accumulators must fit the accumulator budget.
        let mut n_block = match config.n_block {
            Some(nb) => nb.max(1).next_multiple_of(nr),
            None => {
                let budget = (cache.l2_bytes * 9 / 10).saturating_sub(k_block * elem * (mr + nr));
                let by_b = round_down(budget / (elem * k_block), nr);
                let by_acc = round_down(acc_budget / (acc * mr), nr);
                balance(n, by_b.min(by_acc).max(nr), nr)
            }
        }
        .min(n.next_multiple_of(nr));

        // The packed A block takes a quarter of L2 and the accumulator block
        // stays within its budget.
        let mut m_block = match config.m_block {
            Some(mb) => mb.max(1).next_multiple_of(mr),
            None => {
                let by_a = round_down((cache.l2_bytes / 4) / (elem * k_block), mr);
                let by_acc = round_down(acc_budget / (acc * n_block), mr);
                balance(m, by_a.min(by_acc).max(mr), mr)
            }
        }
        .min(m.next_multiple_of(mr));

        let workers = workers.max(1);
        if config.m_block.is_none() && m.div_ceil(m_block) < workers {
            m_block = m.div_ceil(workers).next_multiple_of(mr).min(m_block);
        }
        let m_blocks = m.div_ceil(m_block);
        if config.n_block.is_none() && m_blocks * n.div_ceil(n_block) < workers {
            let per_row = workers.div_ceil(m_blocks);
            n_block = n.div_ceil(per_row).next_multiple_of(nr).min(n_block);
        }

        let params = Self {
            k_block,
            n_block,
            m_block,
        };
        log::debug!(
            "blocking for {} on {}x{}x{} ({} workers): {:?}",
            kernel.name,
            m,
            n,
            k,
            workers,
            params
        );
        params
    }

    pub fn k_blocks(&self, k: usize) -> usize {
        k.div_ceil(self.k_block)
    }

    pub fn n_blocks(&self, n: usize) -> usize {
        n.div_ceil(self.n_block)
    }

    pub fn m_blocks(&self, m: usize) -> usize {
        m.div_ceil(self.m_block)
    }
}

fn round_down(value: usize, multiple: usize) -> usize {
    value / multiple * multiple
}

/// Evens out block sizes so the last block is not a sliver.
fn balance(total: usize, block: usize, unit: usize) -> usize {
    let blocks = total.div_ceil(block);
    total.div_ceil(blocks).next_multiple_of(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{F32_KERNELS, U8_KERNELS};

    fn baseline_u8() -> &'static KernelDescriptor<u8> {
        U8_KERNELS.iter().find(|d| d.is_baseline()).unwrap()
    }

    #[test]
    fn test_balance_avoids_slivers() {
        // 100 in blocks of 48 → 3 blocks; balanced to 34 each (unit 2)
        assert_eq!(balance(100, 48, 2), 34);
        assert_eq!(balance(96, 48, 4), 48);
    }

    #[test]
    fn test_small_problem_is_one_block() {
        let params = BlockingParams::new(baseline_u8(), 12, 8, 16, 1, &GemmConfig::default());
        assert_eq!(params.k_blocks(16), 1);
        assert_eq!(params.n_blocks(8), 1);
        assert_eq!(params.m_blocks(12), 1);
    }

    #[test]
    fn test_overrides_are_rounded_to_tiles() {
        let config = GemmConfig::default()
            .with_k_block(5)
            .with_n_block(5)
            .with_m_block(3);
        let params = BlockingParams::new(baseline_u8(), 100, 100, 100, 8, &config);
        assert_eq!(
            params,
            BlockingParams {
                k_block: 5,
                n_block: 8,
                m_block: 4
            }
        );
    }

    #[test]
    fn test_default_blocks_respect_granularity() {
        let kernel = F32_KERNELS.iter().find(|d| d.is_baseline()).unwrap();
        let params = BlockingParams::new(kernel, 1000, 777, 3000, 1, &GemmConfig::default());
        assert_eq!(params.k_block % kernel.k_unroll, 0);
        assert_eq!(params.n_block % kernel.out_width, 0);
        assert_eq!(params.m_block % kernel.out_height, 0);
        assert!(params.k_blocks(3000) > 1);
    }

    #[test]
    fn test_tiny_cache_still_makes_progress() {
        let config = GemmConfig::default().with_cache(CacheInfo {
            l1_bytes: 1,
            l2_bytes: 1,
        });
        let params = BlockingParams::new(baseline_u8(), 50, 50, 50, 1, &config);
        assert!(params.k_block >= 1 && params.n_block >= 4 && params.m_block >= 4);
    }

    #[test]
    fn test_workers_get_enough_blocks() {
        let kernel = baseline_u8();
        for workers in [2, 4, 8] {
            let params = BlockingParams::new(kernel, 256, 256, 256, workers, &GemmConfig::default());
            let blocks = params.m_blocks(256) * params.n_blocks(256);
            assert!(blocks >= workers, "{} blocks for {} workers", blocks, workers);
        }

        // Too few rows for every worker: N is split as well.
        let params = BlockingParams::new(kernel, 4, 256, 64, 8, &GemmConfig::default());
        assert_eq!(params.m_blocks(4), 1);
        assert!(params.n_blocks(256) >= 8);
    }

    #[test]
    fn test_accumulator_block_fits_half_l2() {
        let kernel = F32_KERNELS.iter().find(|d| d.is_baseline()).unwrap();
        let config = GemmConfig::default();
        for (m, n, k) in [(2048, 2048, 8), (1000, 1000, 16), (64, 100_000, 4)] {
            let params = BlockingParams::new(kernel, m, n, k, 1, &config);
            let acc_bytes = params.m_block * params.n_block * 4;
            assert!(
                acc_bytes <= config.cache.l2_bytes / 2,
                "{}x{}x{}: {:?}",
                m,
                n,
                k,
                params
            );
        }
    }

    #[test]
    fn test_overrides_are_not_split_for_workers() {
        let config = GemmConfig::default().with_m_block(64).with_n_block(64);
        let params = BlockingParams::new(baseline_u8(), 64, 64, 64, 8, &config);
        assert_eq!((params.m_block, params.n_block), (64, 64));
    }
}
