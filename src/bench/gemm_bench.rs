//! Benchmarks for the dispatched GEMM.
//!
//! Compares, per operand type:
//! - the detected kernel against the forced portable baseline
//! - caller-layout B against pretransposed B
//! - one thread against every core

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use interleaved_gemm::{
    Accumulator, CapabilitySet, GemmArgs, GemmArrays, MatrixMut, MatrixRef, Operand, OperandB, make_gemm,
};

fn bench_case<T: Operand>(
    c: &mut Criterion,
    group_name: &str,
    make: impl Fn(usize) -> T,
    sizes: &[usize],
) {
    let mut group = c.benchmark_group(group_name);
    group.sample_size(20);

    let detected = CapabilitySet::detect();
    let threads = num_cpus::get();

    for &size in sizes {
        let (m, n, k) = (size, size, size);
        let a: Vec<T> = (0..m * k).map(&make).collect();
        let b: Vec<T> = (0..k * n).map(&make).collect();
        let mut out = vec![T::Acc::ZERO; m * n];
        group.throughput(Throughput::Elements((2 * m * n * k) as u64));

        let variants = [
            ("baseline", CapabilitySet::baseline(), 1, false),
            ("detected", detected, 1, false),
            ("detected_pretransposed", detected, 1, true),
            ("detected_threaded", detected, threads, false),
        ];

        for (label, caps, max_threads, pretransposed) in variants {
            let args = GemmArgs::new(m, n, k)
                .with_max_threads(max_threads)
                .with_pretransposed_b(pretransposed);
            let mut gemm = make_gemm::<T>(&caps, args).unwrap();

            let packed = if pretransposed {
                let mut packed = vec![T::ZERO; gemm.pretransposed_b_size()];
                gemm.pretranspose_b(MatrixRef::new(&b, n), &mut packed).unwrap();
                packed
            } else {
                Vec::new()
            };
            let b_operand = if pretransposed {
                OperandB::Pretransposed(&packed[..])
            } else {
                OperandB::Raw(MatrixRef::new(&b, n))
            };

            let mut workspace = vec![0u8; gemm.required_workspace_size()];
            let arrays = GemmArrays::new(MatrixRef::new(&a, k), b_operand, MatrixMut::new(&mut out, n));
            gemm.configure(arrays, &mut workspace).unwrap();

            group.bench_with_input(BenchmarkId::new(label, size), &size, |bench, _| {
                bench.iter(|| black_box(gemm.run().unwrap()));
            });
        }
    }

    group.finish();
}

fn bench_u8(c: &mut Criterion) {
    bench_case::<u8>(c, "gemm_u8", |i| (i % 251) as u8, &[128, 256, 512]);
}

fn bench_i8(c: &mut Criterion) {
    bench_case::<i8>(c, "gemm_i8", |i| ((i % 255) as i32 - 127) as i8, &[128, 256, 512]);
}

fn bench_f32(c: &mut Criterion) {
    bench_case::<f32>(c, "gemm_f32", |i| (i % 100) as f32 * 0.01, &[128, 256, 512]);
}

criterion_group!(benches, bench_u8, bench_i8, bench_f32);
criterion_main!(benches);
