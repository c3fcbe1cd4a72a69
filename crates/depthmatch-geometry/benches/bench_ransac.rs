use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use depthmatch_geometry::{find_fundamental, fundamental_8point, RansacParams};

/// Generate correspondences of a rectified stereo pair with a fraction of outliers.
fn generate_stereo_data(n: usize, outlier_every: usize) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
    let mut x1 = Vec::with_capacity(n);
    let mut x2 = Vec::with_capacity(n);
    for i in 0..n {
        let x = (i * 37 % 640) as f64 + 0.25;
        let y = (i * 53 % 480) as f64 + 0.5;
        let disparity = 5.0 + (i % 17) as f64;
        x1.push([x, y]);
        if outlier_every > 0 && i % outlier_every == 0 {
            x2.push([(i * 91 % 640) as f64, (i * 29 % 480) as f64]);
        } else {
            x2.push([x - disparity, y]);
        }
    }
    (x1, x2)
}

fn bench_fundamental_8point(c: &mut Criterion) {
    let mut group = c.benchmark_group("fundamental_8point");
    for &n in &[8, 50, 200] {
        let (x1, x2) = generate_stereo_data(n, 0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let _ = std::hint::black_box(fundamental_8point(&x1, &x2));
            });
        });
    }
    group.finish();
}

fn bench_find_fundamental(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_fundamental");
    let params = RansacParams::default();
    for &n in &[100, 1000, 5000] {
        let (x1, x2) = generate_stereo_data(n, 5);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let _ = std::hint::black_box(find_fundamental(&x1, &x2, &params));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fundamental_8point, bench_find_fundamental);
criterion_main!(benches);
