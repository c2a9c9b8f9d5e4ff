//! Preconditioned BiCGStab, with an optional shadow-vector restart variant.
//!
//! The plain method reports `Breakdown` as soon as one of its denominators
//! collapses. The variable variant instead re-seeds the shadow residual from
//! the current residual and carries on; only a breakdown immediately after
//! such a restart is fatal.

use log::warn;

use crate::dense;
use crate::error::{Result, SolverError};
use crate::matrix::Operator;
use crate::precond::Preconditioner;
use crate::solver::{
    itinfo, relative_residual, stop_normalizer, stop_resnorm, try_workspace, SolveInfo,
    SolverParams, DIVERGE_RATIO,
};
use crate::types::{Precision, PrintLevel, SMALL_REAL};

/// Solve `A x = b` by preconditioned BiCGStab.
pub fn bicgstab(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    bicgstab_driver(a, b, x, pc, params, false)
}

/// Solve `A x = b` by BiCGStab with shadow-vector restart on breakdown.
pub fn vbicgstab(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    bicgstab_driver(a, b, x, pc, params, true)
}

fn bicgstab_driver(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
    restart_shadow: bool,
) -> Result<SolveInfo> {
    let method: &'static str = if restart_shadow { "VBiCGStab" } else { "BiCGStab" };
    let n = b.len();
    let mut r = try_workspace(n)?;
    let mut rhat = try_workspace(n)?;
    let mut p = try_workspace(n)?;
    let mut v = try_workspace(n)?;
    let mut s = try_workspace(n)?;
    let mut t = try_workspace(n)?;
    let mut phat = try_workspace(n)?;
    let mut shat = try_workspace(n)?;

    // r = b - A x, shadow residual pinned to r0
    a.apply(x, &mut r)?;
    dense::axpby(1.0, b, -1.0, &mut r);
    dense::copy(&r, &mut rhat);
    let mut absres = dense::norm2(&r);
    let absres0 = absres;

    let normalizer = stop_normalizer(params.stop_type, b, absres0, pc, &mut p)?;
    let resnorm = stop_resnorm(params.stop_type, &r, absres, pc, &mut shat)?;
    let mut relres = relative_residual(params.stop_type, resnorm, normalizer, dense::norm2(x));
    if relres <= params.tol {
        return Ok(SolveInfo {
            iterations: 0,
            residual: relres,
        });
    }

    let mut rho: Precision = 1.0;
    let mut alpha: Precision = 1.0;
    let mut omega: Precision = 1.0;
    dense::fill(&mut p, 0.0);
    dense::fill(&mut v, 0.0);

    // `fragile` marks the first iteration after a shadow restart: a second
    // breakdown before any progress is fatal even for the variable variant
    let mut fragile = false;
    let mut notified = false;
    let mut iter = 0usize;

    macro_rules! breakdown_or_restart {
        ($reason:expr) => {{
            if !restart_shadow || fragile {
                return Err(SolverError::Breakdown {
                    method,
                    iteration: iter,
                    reason: $reason.to_string(),
                });
            }
            if params.print_level >= PrintLevel::More {
                warn!("{}: {}, restarting with a fresh shadow vector", method, $reason);
            }
            dense::copy(&r, &mut rhat);
            rho = 1.0;
            alpha = 1.0;
            omega = 1.0;
            dense::fill(&mut p, 0.0);
            dense::fill(&mut v, 0.0);
            fragile = true;
            continue;
        }};
    }

    while iter < params.max_iter {
        iter += 1;

        let rho_new = dense::dot(&rhat, &r);
        if rho_new.abs() < SMALL_REAL {
            breakdown_or_restart!("shadow residual became orthogonal to the residual");
        }

        let beta = (rho_new / rho) * (alpha / omega);
        // p = r + beta (p - omega v)
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }

        pc.apply(&p, &mut phat)?;
        a.apply(&phat, &mut v)?;
        let denom = dense::dot(&rhat, &v);
        if denom.abs() < SMALL_REAL {
            breakdown_or_restart!("search direction lost the shadow component");
        }
        alpha = rho_new / denom;

        // s = r - alpha v
        dense::copy(&r, &mut s);
        dense::axpy(-alpha, &v, &mut s);

        pc.apply(&s, &mut shat)?;
        a.apply(&shat, &mut t)?;
        let tt = dense::dot(&t, &t);
        if tt < SMALL_REAL {
            breakdown_or_restart!("stabilization denominator vanished");
        }
        omega = dense::dot(&t, &s) / tt;
        if omega.abs() < SMALL_REAL {
            breakdown_or_restart!("stabilization parameter collapsed to zero");
        }

        dense::axpy(alpha, &phat, x);
        dense::axpy(omega, &shat, x);
        // r = s - omega t
        dense::copy(&s, &mut r);
        dense::axpy(-omega, &t, &mut r);

        rho = rho_new;
        fragile = false;

        let absres_old = absres;
        absres = dense::norm2(&r);
        let resnorm = stop_resnorm(params.stop_type, &r, absres, pc, &mut shat)?;
        let xnorm = dense::norm2(x);
        relres = relative_residual(params.stop_type, resnorm, normalizer, xnorm);
        itinfo(
            params.print_level,
            method,
            iter,
            relres,
            absres,
            absres / absres_old.max(SMALL_REAL),
        );

        if relres > DIVERGE_RATIO {
            return Err(SolverError::Diverge {
                method,
                iteration: iter,
                residual: relres,
            });
        }

        if relres <= params.tol {
            // confirm against the recomputed residual before returning
            a.apply(x, &mut t)?;
            dense::axpby(1.0, b, -1.0, &mut t);
            let true_absres = dense::norm2(&t);
            let true_resnorm = stop_resnorm(params.stop_type, &t, true_absres, pc, &mut shat)?;
            let true_relres =
                relative_residual(params.stop_type, true_resnorm, normalizer, xnorm);
            if true_relres <= params.tol {
                return Ok(SolveInfo {
                    iterations: iter,
                    residual: true_relres,
                });
            }
            if !notified && params.print_level >= PrintLevel::Some {
                warn!(
                    "{}: false convergence at iteration {} (true residual {:.3e}), continuing",
                    method, iter, true_relres
                );
                notified = true;
            }
            dense::copy(&t, &mut r);
            absres = true_absres;
            relres = true_relres;
        }
    }

    Err(SolverError::MaxIter {
        method,
        iterations: iter,
        residual: relres,
        tolerance: params.tol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CooMatrix;
    use crate::precond::Identity;

    #[test]
    fn test_bicgstab_forced_breakdown() {
        // the swap matrix drives the stabilization denominator to zero
        let a = CooMatrix::from_triplets(2, 2, &[(0, 1, 1.0), (1, 0, 1.0)])
            .unwrap()
            .to_csr();
        let b = vec![1.0, 1.0];
        let mut x = vec![0.0; 2];
        let params = SolverParams::default();

        assert!(matches!(
            bicgstab(&a, &b, &mut x, &mut Identity, &params),
            Err(SolverError::Breakdown { .. })
        ));
    }

    #[test]
    fn test_bicgstab_nonsymmetric_tridiagonal() {
        let n = 60;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 3.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.5));
            }
        }
        let a = CooMatrix::from_triplets(n, n, &triplets).unwrap().to_csr();
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let params = SolverParams::default().with_tol(1e-10).with_max_iter(500);

        let info = bicgstab(&a, &b, &mut x, &mut Identity, &params).unwrap();
        assert!(info.residual <= 1e-10);

        let mut residual = vec![0.0; n];
        a.apply(&x, &mut residual).unwrap();
        dense::axpby(1.0, &b, -1.0, &mut residual);
        assert!(dense::norm2(&residual) / dense::norm2(&b) <= 1e-9);
    }

    #[test]
    fn test_vbicgstab_survives_plain_breakdown_matrix() {
        // same swap system: the variable variant restarts once, then the
        // repeated breakdown right after the restart is fatal
        let a = CooMatrix::from_triplets(2, 2, &[(0, 1, 1.0), (1, 0, 1.0)])
            .unwrap()
            .to_csr();
        let b = vec![1.0, 1.0];
        let mut x = vec![0.0; 2];
        let params = SolverParams::default();

        assert!(matches!(
            vbicgstab(&a, &b, &mut x, &mut Identity, &params),
            Err(SolverError::Breakdown { .. })
        ));
    }
}
