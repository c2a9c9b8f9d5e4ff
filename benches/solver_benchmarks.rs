use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use sparsolve::{
    solve, CooMatrix, CsrMatrix, CsrlMatrix, Jacobi, Operator, SolverKind, SolverParams,
};

/// 2-D Poisson 5-point stencil on an `nx` x `nx` grid.
fn poisson_2d(nx: usize) -> CsrMatrix {
    let n = nx * nx;
    let mut triplets = Vec::with_capacity(5 * n);
    for row in 0..nx {
        for col in 0..nx {
            let i = row * nx + col;
            triplets.push((i, i, 4.0));
            if col + 1 < nx {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
            if row + 1 < nx {
                triplets.push((i, i + nx, -1.0));
                triplets.push((i + nx, i, -1.0));
            }
        }
    }
    CooMatrix::from_triplets(n, n, &triplets).unwrap().to_csr()
}

fn benchmark_spmv(c: &mut Criterion) {
    let mut group = c.benchmark_group("spmv");
    group.measurement_time(Duration::from_secs(5));

    for nx in [32usize, 64, 128] {
        let a = poisson_2d(nx);
        let grouped = CsrlMatrix::from_csr(&a);
        let n = nx * nx;
        let x: Vec<f64> = (0..n).map(|i| 1.0 + (i as f64) * 0.1).collect();
        let mut y = vec![0.0; n];

        group.bench_with_input(BenchmarkId::new("csr", nx), &nx, |bench, _| {
            bench.iter(|| {
                a.apply(black_box(&x), &mut y).unwrap();
                black_box(&y);
            });
        });
        group.bench_with_input(BenchmarkId::new("csrl", nx), &nx, |bench, _| {
            bench.iter(|| {
                grouped.apply(black_box(&x), &mut y).unwrap();
                black_box(&y);
            });
        });
    }
    group.finish();
}

fn benchmark_krylov_cores(c: &mut Criterion) {
    let mut group = c.benchmark_group("krylov");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    let nx = 32;
    let a = poisson_2d(nx);
    let n = nx * nx;
    let b = vec![1.0; n];

    for kind in [SolverKind::Cg, SolverKind::Gmres, SolverKind::BiCgStab] {
        let params = SolverParams::new(kind)
            .with_tol(1e-8)
            .with_restart(30)
            .with_max_iter(2000);

        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |bench, _| {
            bench.iter(|| {
                let mut x = vec![0.0; n];
                let mut jacobi = Jacobi::from_csr(&a).unwrap();
                black_box(solve(&a, &b, &mut x, Some(&mut jacobi), &params).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_spmv, benchmark_krylov_cores);
criterion_main!(benches);
