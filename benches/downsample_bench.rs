use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tdms_analytics_core::downsample::{lttb, uniform};

fn signal(n: usize) -> (Vec<f64>, Vec<f64>) {
    let xs: Vec<f64> = (0..n).map(|i| i as f64 * 1e-3).collect();
    let ys = xs
        .iter()
        .map(|x| (x * 50.0).sin() + 0.3 * (x * 733.0).cos())
        .collect();
    (xs, ys)
}

fn bench_downsample(c: &mut Criterion) {
    let mut group = c.benchmark_group("downsample");
    for n in [50_000usize, 200_000] {
        let (xs, ys) = signal(n);
        group.bench_with_input(BenchmarkId::new("lttb_2000", n), &n, |b, _| {
            b.iter(|| lttb(black_box(&xs), black_box(&ys), 2_000))
        });
        group.bench_with_input(BenchmarkId::new("uniform_2000", n), &n, |b, &n| {
            b.iter(|| uniform(black_box(n), 2_000))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_downsample);
criterion_main!(benches);
