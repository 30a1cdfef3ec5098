use basin_edt::transforms::{basins_with_kernel, BasinInput};
use basin_edt::utilities::Kernel;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn synthetic_volume(dim0: usize, dim1: usize, dim2: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(0xBE7C);
    (0..dim0 * dim1 * dim2)
        .map(|_| (rng.random::<u32>() % 4096) as f64)
        .collect()
}

fn bench_single_row(c: &mut Criterion) {
    let mut group = c.benchmark_group("basin_single_row");
    for &n in &[256usize, 4096, 65536] {
        let f = synthetic_volume(1, n, 1);
        group.bench_with_input(BenchmarkId::from_parameter(n), &f, |b, f| {
            b.iter(|| {
                basins_with_kernel(&BasinInput::from_row(black_box(f)), Kernel::Scalar).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_volume(c: &mut Criterion) {
    let mut group = c.benchmark_group("basin_volume_64x256x64");
    let shape = (64usize, 256usize, 64usize);
    let f = synthetic_volume(shape.0, shape.1, shape.2);
    group.bench_function("serial", |b| {
        b.iter(|| {
            basins_with_kernel(
                &BasinInput::from_volume(black_box(&f), shape),
                Kernel::Scalar,
            )
            .unwrap()
        })
    });
    group.bench_function("parallel", |b| {
        b.iter(|| {
            basins_with_kernel(
                &BasinInput::from_volume(black_box(&f), shape),
                Kernel::ScalarBatch,
            )
            .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_single_row, bench_volume);
criterion_main!(benches);
