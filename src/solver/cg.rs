//! Preconditioned conjugate gradient.
//!
//! Classical PCG for symmetric positive-definite `A` and `M`. Carries the
//! full safeguard set: divergence and stagnation detection, plus an explicit
//! residual re-measurement whenever the recurrence claims convergence.

use log::warn;

use crate::dense;
use crate::error::{Result, SolverError};
use crate::matrix::Operator;
use crate::precond::Preconditioner;
use crate::solver::{
    itinfo, relative_residual, stop_normalizer, stop_resnorm, try_workspace, SolveInfo,
    SolverParams, DIVERGE_RATIO, MAX_STAG, STAG_RATIO,
};
use crate::types::{Precision, PrintLevel, StopType, SMALL_REAL};

const METHOD: &str = "CG";

/// Solve `A x = b` by preconditioned CG.
pub fn cg(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    let n = b.len();
    let mut r = try_workspace(n)?;
    let mut z = try_workspace(n)?;
    let mut p = try_workspace(n)?;
    let mut ap = try_workspace(n)?;

    // r = b - A x
    a.apply(x, &mut r)?;
    dense::axpby(1.0, b, -1.0, &mut r);
    let mut absres = dense::norm2(&r);
    let absres0 = absres;

    let normalizer = stop_normalizer(params.stop_type, b, absres0, pc, &mut p)?;
    pc.apply(&r, &mut z)?;
    let mut rho = dense::dot(&r, &z);

    let resnorm = match params.stop_type {
        StopType::RelPrecRes => rho.abs().sqrt(),
        _ => absres,
    };
    let mut relres = relative_residual(params.stop_type, resnorm, normalizer, dense::norm2(x));
    if relres <= params.tol {
        return Ok(SolveInfo {
            iterations: 0,
            residual: relres,
        });
    }

    dense::copy(&z, &mut p);
    let mut restarts = 0usize;
    let mut notified = false;
    let mut iter = 0usize;

    while iter < params.max_iter {
        iter += 1;

        a.apply(&p, &mut ap)?;
        let pap = dense::dot(&p, &ap);
        if pap.abs() < SMALL_REAL {
            return Err(SolverError::Breakdown {
                method: METHOD,
                iteration: iter,
                reason: "search direction annihilated by the operator".to_string(),
            });
        }

        let alpha = rho / pap;
        dense::axpy(alpha, &p, x);
        dense::axpy(-alpha, &ap, &mut r);

        pc.apply(&r, &mut z)?;
        let rho_new = dense::dot(&r, &z);

        let absres_old = absres;
        absres = dense::norm2(&r);
        let resnorm = match params.stop_type {
            StopType::RelPrecRes => rho_new.abs().sqrt(),
            _ => absres,
        };
        let xnorm = dense::norm2(x);
        relres = relative_residual(params.stop_type, resnorm, normalizer, xnorm);
        itinfo(
            params.print_level,
            METHOD,
            iter,
            relres,
            absres,
            absres / absres_old.max(SMALL_REAL),
        );

        if relres > DIVERGE_RATIO {
            return Err(SolverError::Diverge {
                method: METHOD,
                iteration: iter,
                residual: relres,
            });
        }

        // stagnation suspicion: the update no longer moves the solution
        let step = alpha.abs() * dense::norm2(&p);
        if relres > params.tol && step <= STAG_RATIO * xnorm.max(SMALL_REAL) {
            restarts += 1;
            if restarts > MAX_STAG {
                return Err(SolverError::Stagnation {
                    method: METHOD,
                    iteration: iter,
                    residual: relres,
                });
            }
            if params.print_level >= PrintLevel::More {
                warn!("{}: negligible solution update, restarting from the true residual", METHOD);
            }
            a.apply(x, &mut r)?;
            dense::axpby(1.0, b, -1.0, &mut r);
            absres = dense::norm2(&r);
            pc.apply(&r, &mut z)?;
            rho = dense::dot(&r, &z);
            dense::copy(&z, &mut p);
            continue;
        }

        if relres <= params.tol {
            // re-measure before declaring victory; the recurrence can drift
            a.apply(x, &mut ap)?;
            dense::axpby(1.0, b, -1.0, &mut ap);
            let true_absres = dense::norm2(&ap);
            let true_resnorm = stop_resnorm(params.stop_type, &ap, true_absres, pc, &mut z)?;
            let true_relres =
                relative_residual(params.stop_type, true_resnorm, normalizer, xnorm);
            if true_relres <= params.tol {
                return Ok(SolveInfo {
                    iterations: iter,
                    residual: true_relres,
                });
            }

            restarts += 1;
            if restarts > MAX_STAG {
                return Err(SolverError::Stagnation {
                    method: METHOD,
                    iteration: iter,
                    residual: true_relres,
                });
            }
            if !notified && params.print_level >= PrintLevel::Some {
                warn!(
                    "{}: false convergence at iteration {} (true residual {:.3e}), continuing",
                    METHOD, iter, true_relres
                );
                notified = true;
            }
            dense::copy(&ap, &mut r);
            absres = true_absres;
            pc.apply(&r, &mut z)?;
            rho = dense::dot(&r, &z);
            dense::copy(&z, &mut p);
            relres = true_relres;
            continue;
        }

        if rho.abs() < SMALL_REAL {
            return Err(SolverError::Breakdown {
                method: METHOD,
                iteration: iter,
                reason: "preconditioned residual inner product vanished".to_string(),
            });
        }
        let beta = rho_new / rho;
        dense::axpby(1.0, &z, beta, &mut p);
        rho = rho_new;
    }

    Err(SolverError::MaxIter {
        method: METHOD,
        iterations: iter,
        residual: relres,
        tolerance: params.tol,
    })
}
