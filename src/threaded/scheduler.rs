//! Thread count selection and scoped fan-out.

use std::ops::Range;
use std::thread;

/// Threads a handle plans for: `max_threads` capped at the CPU count.
///
/// Zero is treated as one.
pub fn choose_thread_count(max_threads: usize) -> usize {
    max_threads.min(num_cpus::get()).max(1)
}

/// Splits `0..total` into at most `parts` contiguous ranges whose lengths
/// differ by at most one. Empty ranges are dropped.
pub fn partition(total: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, total.max(1));
    let base = total / parts;
    let extra = total % parts;

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        if len > 0 {
            ranges.push(start..start + len);
        }
        start += len;
    }
    ranges
}

/// Runs `work` over `0..total_units` on up to `threads` threads.
///
/// Thread `i` receives the `i`-th range from [`partition`] and the `i`-th
/// `per_thread`-byte chunk of `workspace`. A single range runs on the calling
/// thread. Panics in workers propagate once all of them have finished.
pub fn run_partitioned<F>(
    total_units: usize,
    threads: usize,
    workspace: &mut [u8],
    per_thread: usize,
    work: F,
) where
    F: Fn(Range<usize>, &mut [u8]) + Sync,
{
    let ranges = partition(total_units, threads);
    log::trace!(
        "{} work units over {} threads: {:?}",
        total_units,
        ranges.len(),
        ranges
    );

    match ranges.as_slice() {
        [] => {}
        [only] => work(only.clone(), &mut workspace[..per_thread]),
        _ => {
            let work = &work;
            thread::scope(|s| {
                for (range, chunk) in ranges.into_iter().zip(workspace.chunks_exact_mut(per_thread)) {
                    s.spawn(move || work(range, chunk));
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_partition_is_balanced_and_contiguous() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_partition_more_parts_than_work() {
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
        assert_eq!(partition(0, 4), Vec::<Range<usize>>::new());
        assert_eq!(partition(5, 0), vec![0..5]);
    }

    #[test]
    fn test_thread_count_bounds() {
        assert_eq!(choose_thread_count(0), 1);
        assert_eq!(choose_thread_count(1), 1);
        assert!(choose_thread_count(usize::MAX) <= num_cpus::get());
    }

    #[test]
    fn test_every_unit_runs_once_with_own_chunk() {
        let seen = AtomicUsize::new(0);
        let mut workspace = vec![0u8; 4 * 16];

        run_partitioned(37, 4, &mut workspace, 16, |range, chunk| {
            assert_eq!(chunk.len(), 16);
            chunk.fill(range.len() as u8);
            seen.fetch_add(range.len(), Ordering::Relaxed);
        });

        assert_eq!(seen.load(Ordering::Relaxed), 37);
        // 37 over 4 threads: 10, 9, 9, 9
        assert_eq!(workspace[0], 10);
        assert_eq!(workspace[63], 9);
    }
}
