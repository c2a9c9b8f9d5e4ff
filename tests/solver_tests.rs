//! End-to-end solver scenarios on model problems.

use sparsolve::{
    bicgstab, solve, CooMatrix, CsrMatrix, Identity, Jacobi, Operator, PrintLevel, SolverError,
    SolverKind, SolverParams, StopType,
};

/// 2-D Poisson 5-point stencil on an `nx` x `nx` grid with Dirichlet
/// boundaries eliminated.
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

/// 1-D advection-diffusion with first-order upwinding of the advective term.
fn advection_diffusion_1d(n: usize, velocity: f64) -> CsrMatrix {
    let h = 1.0 / (n as f64 + 1.0);
    let diffusion = 1.0 / (h * h);
    let advection = velocity / h;
    let mut triplets = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push((i, i, 2.0 * diffusion + advection));
        if i + 1 < n {
            triplets.push((i, i + 1, -diffusion));
            triplets.push((i + 1, i, -diffusion - advection));
        }
    }
    CooMatrix::from_triplets(n, n, &triplets).unwrap().to_csr()
}

fn recomputed_relres(a: &CsrMatrix, b: &[f64], x: &[f64]) -> f64 {
    let mut r = vec![0.0; b.len()];
    a.apply(x, &mut r).unwrap();
    for (ri, &bi) in r.iter_mut().zip(b.iter()) {
        *ri = bi - *ri;
    }
    let rnorm: f64 = r.iter().map(|v| v * v).sum::<f64>().sqrt();
    let bnorm: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    rnorm / bnorm
}

#[test]
fn identity_system_converges_in_one_iteration() {
    let a = CsrMatrix::identity(10);
    let b = vec![1.0; 10];
    let mut x = vec![0.0; 10];
    let params = SolverParams::new(SolverKind::Cg).with_tol(1e-12);

    let info = solve(&a, &b, &mut x, Some(&mut Identity), &params).unwrap();
    assert_eq!(info.iterations, 1);
    for xi in &x {
        assert!((xi - 1.0).abs() < 1e-14);
    }
}

#[test]
fn diagonal_system_with_jacobi_takes_one_iteration() {
    let diag: Vec<f64> = (1..=100).map(|i| i as f64).collect();
    let a = CsrMatrix::from_diagonal(&diag);
    let b = vec![1.0; 100];
    let mut x = vec![0.0; 100];
    let params = SolverParams::new(SolverKind::Cg).with_tol(1e-12);

    let mut jacobi = Jacobi::from_csr(&a).unwrap();
    let info = solve(&a, &b, &mut x, Some(&mut jacobi), &params).unwrap();
    assert_eq!(info.iterations, 1);
    for (i, xi) in x.iter().enumerate() {
        assert!((xi - 1.0 / (i as f64 + 1.0)).abs() < 1e-12);
    }
}

#[test]
fn diagonal_system_without_preconditioner_needs_more_work() {
    let diag: Vec<f64> = (1..=100).map(|i| i as f64).collect();
    let a = CsrMatrix::from_diagonal(&diag);
    let b = vec![1.0; 100];
    let mut x = vec![0.0; 100];
    let params = SolverParams::new(SolverKind::Cg)
        .with_tol(1e-12)
        .with_max_iter(300);

    let info = solve(&a, &b, &mut x, None, &params).unwrap();
    // finite termination bounds the count by the number of distinct
    // eigenvalues, up to a little floating-point slack
    assert!(info.iterations > 1);
    assert!(info.iterations <= 150, "took {} iterations", info.iterations);
    assert!(recomputed_relres(&a, &b, &x) <= 1e-10);
}

#[test]
fn poisson_gmres_with_jacobi() {
    let _ = env_logger::builder().is_test(true).try_init();

    let a = poisson_2d(64);
    let n = 64 * 64;
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];
    let params = SolverParams::new(SolverKind::Gmres)
        .with_tol(1e-8)
        .with_restart(30)
        .with_max_iter(5000)
        .with_print_level(PrintLevel::Min);

    let mut jacobi = Jacobi::from_csr(&a).unwrap();
    let info = solve(&a, &b, &mut x, Some(&mut jacobi), &params).unwrap();
    assert!(info.iterations >= 30, "only {} iterations", info.iterations);
    assert!(info.iterations <= 200, "took {} iterations", info.iterations);
    assert!(recomputed_relres(&a, &b, &x) <= 1e-8);
}

#[test]
fn advection_diffusion_bicgstab_converges_without_breakdown() {
    let a = advection_diffusion_1d(500, 20.0);
    let b = vec![1.0; 500];
    let mut x = vec![0.0; 500];
    let params = SolverParams::new(SolverKind::BiCgStab)
        .with_tol(1e-8)
        .with_max_iter(1000);

    let outcome = solve(&a, &b, &mut x, None, &params);
    assert!(
        !matches!(outcome, Err(SolverError::Breakdown { .. })),
        "unexpected breakdown"
    );
    outcome.unwrap();
    assert!(recomputed_relres(&a, &b, &x) <= 1e-8);
}

#[test]
fn swap_matrix_forces_bicgstab_breakdown() {
    let a = CooMatrix::from_triplets(2, 2, &[(0, 1, 1.0), (1, 0, 1.0)])
        .unwrap()
        .to_csr();
    let b = vec![1.0, 1.0];
    let mut x = vec![0.0, 0.0];
    let params = SolverParams::new(SolverKind::BiCgStab);

    assert!(matches!(
        bicgstab(&a, &b, &mut x, &mut Identity, &params),
        Err(SolverError::Breakdown { .. })
    ));
}

#[test]
fn poisson_vgmres_variable_restart() {
    let a = poisson_2d(128);
    let n = 128 * 128;
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];
    let params = SolverParams::new(SolverKind::VGmres)
        .with_tol(1e-6)
        .with_restart(30)
        .with_max_iter(20000);

    let mut jacobi = Jacobi::from_csr(&a).unwrap();
    let info = solve(&a, &b, &mut x, Some(&mut jacobi), &params).unwrap();
    assert!(info.iterations >= 30);
    assert!(recomputed_relres(&a, &b, &x) <= 1e-6);
}

#[test]
fn all_methods_agree_on_an_spd_system() {
    let a = poisson_2d(12);
    let n = 12 * 12;
    let b: Vec<f64> = (0..n).map(|i| ((i % 7) as f64) - 3.0).collect();

    for kind in [
        SolverKind::Cg,
        SolverKind::BiCgStab,
        SolverKind::VBiCgStab,
        SolverKind::MinRes,
        SolverKind::Gmres,
        SolverKind::VGmres,
        SolverKind::VFGmres,
        SolverKind::Gcr,
        SolverKind::Gcg,
    ] {
        let mut x = vec![0.0; n];
        let params = SolverParams::new(kind)
            .with_tol(1e-10)
            .with_restart(30)
            .with_max_iter(5000);
        let mut jacobi = Jacobi::from_csr(&a).unwrap();
        solve(&a, &b, &mut x, Some(&mut jacobi), &params)
            .unwrap_or_else(|e| panic!("{kind} failed: {e}"));
        assert!(
            recomputed_relres(&a, &b, &x) <= 1e-9,
            "{kind} residual too large"
        );
    }
}

#[test]
fn stopping_tests_all_converge() {
    let a = poisson_2d(10);
    let n = 100;
    let b = vec![1.0; n];

    for stop in [StopType::RelRes, StopType::RelPrecRes, StopType::RelModRes] {
        let mut x = vec![0.0; n];
        let params = SolverParams::new(SolverKind::Cg)
            .with_tol(1e-10)
            .with_stop_type(stop)
            .with_max_iter(500);
        let mut jacobi = Jacobi::from_csr(&a).unwrap();
        solve(&a, &b, &mut x, Some(&mut jacobi), &params).unwrap();
        assert!(recomputed_relres(&a, &b, &x) <= 1e-8);
    }
}

#[test]
fn zero_rhs_returns_immediately() {
    let a = poisson_2d(8);
    let b = vec![0.0; 64];
    let mut x = vec![0.0; 64];
    let params = SolverParams::new(SolverKind::Cg);

    let info = solve(&a, &b, &mut x, None, &params).unwrap();
    assert_eq!(info.iterations, 0);
    assert!(x.iter().all(|&v| v == 0.0));
}

#[test]
fn unknown_solver_name_is_reported() {
    let err = "ssor".parse::<SolverKind>().unwrap_err();
    assert!(matches!(err, SolverError::SolverType { .. }));
}

#[test]
fn invalid_tolerance_is_rejected() {
    let a = CsrMatrix::identity(4);
    let b = vec![1.0; 4];
    let mut x = vec![0.0; 4];
    let params = SolverParams::new(SolverKind::Cg).with_tol(-1.0);

    assert!(matches!(
        solve(&a, &b, &mut x, None, &params),
        Err(SolverError::InputParam { .. })
    ));
}
