//! Preconditioned minimal residual method for symmetric indefinite systems.
//!
//! Three-term Lanczos recurrence with a Givens rotation applied to the
//! tridiagonal as it grows. The rotation residual estimate drives the inner
//! loop; any convergence claim is confirmed against the recomputed residual,
//! and a failed claim restarts the recurrence from the current iterate.

use log::warn;

use crate::dense;
use crate::error::{Result, SolverError};
use crate::matrix::Operator;
use crate::precond::Preconditioner;
use crate::solver::{
    itinfo, relative_residual, stop_normalizer, stop_resnorm, try_workspace, SolveInfo,
    SolverParams, DIVERGE_RATIO, MAX_STAG,
};
use crate::types::{Precision, PrintLevel, SMALL_REAL};

const METHOD: &str = "MinRes";

/// Solve `A x = b` by preconditioned MinRes.
///
/// Requires symmetric `A` and symmetric positive-definite `M`; a negative
/// `⟨r, M⁻¹r⟩` is reported as breakdown.
pub fn minres(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    let n = b.len();
    let mut r1 = try_workspace(n)?;
    let mut r2 = try_workspace(n)?;
    let mut y = try_workspace(n)?;
    let mut v = try_workspace(n)?;
    let mut w = try_workspace(n)?;
    let mut w1 = try_workspace(n)?;
    let mut w2 = try_workspace(n)?;

    let mut normalizer = None;
    let mut iter = 0usize;
    let mut restarts = 0usize;
    let mut notified = false;

    'outer: loop {
        // fresh Lanczos seed from the true residual
        a.apply(x, &mut r1)?;
        dense::axpby(1.0, b, -1.0, &mut r1);
        let absres = dense::norm2(&r1);

        pc.apply(&r1, &mut y)?;
        let beta1_sq = dense::dot(&r1, &y);
        if beta1_sq < 0.0 {
            return Err(SolverError::Breakdown {
                method: METHOD,
                iteration: iter,
                reason: "preconditioner is not positive definite".to_string(),
            });
        }
        let beta1 = beta1_sq.sqrt();

        let norm = match normalizer {
            Some(norm) => norm,
            None => {
                let norm = stop_normalizer(params.stop_type, b, absres.max(beta1), pc, &mut v)?;
                normalizer = Some(norm);
                norm
            }
        };

        let resnorm = stop_resnorm(params.stop_type, &r1, absres, pc, &mut v)?;
        let relres = relative_residual(params.stop_type, resnorm, norm, dense::norm2(x));
        if relres <= params.tol {
            return Ok(SolveInfo {
                iterations: iter,
                residual: relres,
            });
        }
        if iter >= params.max_iter {
            return Err(SolverError::MaxIter {
                method: METHOD,
                iterations: iter,
                residual: relres,
                tolerance: params.tol,
            });
        }
        if beta1 < SMALL_REAL {
            // the M-norm of the residual is exhausted but the stopping test
            // disagrees; nothing further can be extracted
            return Err(SolverError::Stagnation {
                method: METHOD,
                iteration: iter,
                residual: relres,
            });
        }

        dense::copy(&r1, &mut r2);
        dense::fill(&mut w, 0.0);
        dense::fill(&mut w1, 0.0);
        dense::fill(&mut w2, 0.0);

        let mut oldb: Precision = 0.0;
        let mut beta = beta1;
        let mut dbar: Precision = 0.0;
        let mut epsln: Precision = 0.0;
        let mut phibar = beta1;
        let mut cs: Precision = -1.0;
        let mut sn: Precision = 0.0;
        let mut first = true;

        while iter < params.max_iter {
            iter += 1;

            // next Lanczos vector
            let scale = 1.0 / beta;
            dense::copy(&y, &mut v);
            dense::scale(scale, &mut v);

            a.apply(&v, &mut y)?;
            if !first {
                dense::axpy(-beta / oldb, &r1, &mut y);
            }
            let alfa = dense::dot(&v, &y);
            dense::axpy(-alfa / beta, &r2, &mut y);
            core::mem::swap(&mut r1, &mut r2);
            core::mem::swap(&mut r2, &mut y);
            pc.apply(&r2, &mut y)?;

            oldb = beta;
            let beta_sq = dense::dot(&r2, &y);
            if beta_sq < 0.0 {
                return Err(SolverError::Breakdown {
                    method: METHOD,
                    iteration: iter,
                    reason: "preconditioner is not positive definite".to_string(),
                });
            }
            beta = beta_sq.sqrt();

            // rotate the new tridiagonal column
            let oldeps = epsln;
            let delta = cs * dbar + sn * alfa;
            let gbar = sn * dbar - cs * alfa;
            epsln = sn * beta;
            dbar = -cs * beta;

            let gamma = (gbar * gbar + beta * beta).sqrt().max(SMALL_REAL);
            cs = gbar / gamma;
            sn = beta / gamma;
            let phi = cs * phibar;
            phibar *= sn;

            // w <- (v - oldeps w1 - delta w2) / gamma, shifting the window
            core::mem::swap(&mut w1, &mut w2);
            core::mem::swap(&mut w2, &mut w);
            for i in 0..n {
                w[i] = (v[i] - oldeps * w1[i] - delta * w2[i]) / gamma;
            }
            dense::axpy(phi, &w, x);

            let est_relres = relative_residual(
                params.stop_type,
                phibar,
                norm,
                dense::norm2(x),
            );
            itinfo(
                params.print_level,
                METHOD,
                iter,
                est_relres,
                phibar,
                sn.abs(),
            );

            if est_relres > DIVERGE_RATIO {
                return Err(SolverError::Diverge {
                    method: METHOD,
                    iteration: iter,
                    residual: est_relres,
                });
            }

            first = false;

            if est_relres <= params.tol || beta < SMALL_REAL {
                restarts += 1;
                if restarts > MAX_STAG {
                    return Err(SolverError::Stagnation {
                        method: METHOD,
                        iteration: iter,
                        residual: est_relres,
                    });
                }
                if !notified && params.print_level >= PrintLevel::Some {
                    warn!(
                        "{}: rotation estimate claims convergence at iteration {}, re-measuring",
                        METHOD, iter
                    );
                    notified = true;
                }
                continue 'outer;
            }
        }

        // cap hit inside the recurrence: report against the true residual
        a.apply(x, &mut r1)?;
        dense::axpby(1.0, b, -1.0, &mut r1);
        let absres = dense::norm2(&r1);
        let resnorm = stop_resnorm(params.stop_type, &r1, absres, pc, &mut v)?;
        let relres = relative_residual(params.stop_type, resnorm, norm, dense::norm2(x));
        if relres <= params.tol {
            return Ok(SolveInfo {
                iterations: iter,
                residual: relres,
            });
        }
        return Err(SolverError::MaxIter {
            method: METHOD,
            iterations: iter,
            residual: relres,
            tolerance: params.tol,
        });
    }
}
