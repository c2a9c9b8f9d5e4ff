//! Right-preconditioned restarted GMRES.
//!
//! Modified Gram-Schmidt orthogonalization with a Givens-rotation
//! least-squares update. The rotation estimate drives the inner loop; the
//! true residual is recomputed at every restart boundary, so a convergence
//! claim that does not survive the re-measurement simply continues from the
//! true residual after a single notice.
//!
//! The driver here is shared with the adaptive-restart and flexible variants
//! ([`vgmres`](crate::solver::vgmres), [`vfgmres`](crate::solver::fgmres)).

use log::warn;

use crate::dense;
use crate::error::{Result, SolverError};
use crate::matrix::Operator;
use crate::precond::Preconditioner;
use crate::solver::{
    itinfo, relative_residual, stop_normalizer, stop_resnorm, try_workspace, vgmres::next_restart,
    SolveInfo, SolverParams, DIVERGE_RATIO,
};
use crate::types::{Precision, PrintLevel, StopType, SMALL_REAL};

/// Solve `A x = b` by right-preconditioned GMRES with a fixed restart.
pub fn gmres(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    gmres_driver(a, b, x, pc, params, false, false, "GMRES")
}

/// Krylov workspace for one restart cycle.
pub(crate) struct GmresWorkspace {
    /// Orthonormal basis, `m + 1` vectors of length `n`
    basis: Vec<Vec<Precision>>,
    /// Preconditioned basis (flexible variants only), `m` vectors
    zbasis: Vec<Vec<Precision>>,
    /// Hessenberg matrix, `(m + 1) x m`, row-major
    hess: Vec<Vec<Precision>>,
    /// Givens cosines
    cs: Vec<Precision>,
    /// Givens sines
    sn: Vec<Precision>,
    /// Rotated right-hand side of the least-squares problem
    rs: Vec<Precision>,
    /// Least-squares solution
    y: Vec<Precision>,
    /// Candidate basis vector
    w: Vec<Precision>,
    /// Preconditioner output
    z: Vec<Precision>,
    /// True residual
    r: Vec<Precision>,
}

impl GmresWorkspace {
    fn alloc_exact(n: usize, m: usize, flexible: bool) -> Result<Self> {
        let mut basis = Vec::new();
        for _ in 0..=m {
            basis.push(try_workspace(n)?);
        }
        let mut zbasis = Vec::new();
        if flexible {
            for _ in 0..m {
                zbasis.push(try_workspace(n)?);
            }
        }
        let mut hess = Vec::new();
        for _ in 0..=m {
            hess.push(try_workspace(m)?);
        }
        Ok(Self {
            basis,
            zbasis,
            hess,
            cs: try_workspace(m)?,
            sn: try_workspace(m)?,
            rs: try_workspace(m + 1)?,
            y: try_workspace(m)?,
            w: try_workspace(n)?,
            z: try_workspace(n)?,
            r: try_workspace(n)?,
        })
    }

    /// Allocate for restart `m`, shrinking by 5 on failure until the length
    /// would fall below 5.
    fn alloc(n: usize, mut m: usize, flexible: bool) -> Result<(Self, usize)> {
        loop {
            match Self::alloc_exact(n, m, flexible) {
                Ok(ws) => return Ok((ws, m)),
                Err(_) if m >= 10 => m -= 5,
                Err(err) => return Err(err),
            }
        }
    }
}

/// Plane rotation annihilating `b` against `a`.
fn givens(a: Precision, b: Precision) -> (Precision, Precision) {
    let r = (a * a + b * b).sqrt();
    if r < SMALL_REAL {
        (1.0, 0.0)
    } else {
        (a / r, b / r)
    }
}

/// Solve the rotated upper-triangular system for the correction weights.
fn back_substitute(
    hess: &[Vec<Precision>],
    rs: &[Precision],
    k: usize,
    y: &mut [Precision],
    iter: usize,
    method: &'static str,
) -> Result<()> {
    for i in (0..k).rev() {
        let mut t = rs[i];
        for (l, &yl) in y.iter().enumerate().take(k).skip(i + 1) {
            t -= hess[i][l] * yl;
        }
        if hess[i][i].abs() < SMALL_REAL {
            return Err(SolverError::Breakdown {
                method,
                iteration: iter,
                reason: "singular Hessenberg diagonal".to_string(),
            });
        }
        y[i] = t / hess[i][i];
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn gmres_driver(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
    variable_restart: bool,
    flexible: bool,
    method: &'static str,
) -> Result<SolveInfo> {
    let n = b.len();
    let requested = params.restart.clamp(1, n.max(1));
    let (mut ws, restart_max) = GmresWorkspace::alloc(n, requested, flexible)?;

    let mut m = restart_max;
    let mut iter = 0usize;
    let mut normalizer = None;
    let mut absres_prev_cycle: Precision = 0.0;
    let mut first_cycle = true;
    let mut pending_claim = false;
    let mut notified = false;

    loop {
        // true residual at every restart boundary
        a.apply(x, &mut ws.r)?;
        dense::axpby(1.0, b, -1.0, &mut ws.r);
        let mut absres = dense::norm2(&ws.r);

        let norm = match normalizer {
            Some(norm) => norm,
            None => {
                let norm = stop_normalizer(params.stop_type, b, absres, pc, &mut ws.w)?;
                normalizer = Some(norm);
                norm
            }
        };

        let xnorm = dense::norm2(x);
        let resnorm = stop_resnorm(params.stop_type, &ws.r, absres, pc, &mut ws.w)?;
        let relres = relative_residual(params.stop_type, resnorm, norm, xnorm);
        if relres <= params.tol {
            return Ok(SolveInfo {
                iterations: iter,
                residual: relres,
            });
        }
        if pending_claim {
            pending_claim = false;
            if !notified && params.print_level >= PrintLevel::Some {
                warn!(
                    "{}: false convergence at iteration {} (true residual {:.3e}), continuing",
                    method, iter, relres
                );
                notified = true;
            }
        }
        if iter >= params.max_iter {
            return Err(SolverError::MaxIter {
                method,
                iterations: iter,
                residual: relres,
                tolerance: params.tol,
            });
        }
        if relres > DIVERGE_RATIO {
            return Err(SolverError::Diverge {
                method,
                iteration: iter,
                residual: relres,
            });
        }
        if absres < SMALL_REAL {
            return Err(SolverError::Breakdown {
                method,
                iteration: iter,
                reason: "residual vanished but the stopping test disagrees".to_string(),
            });
        }

        if variable_restart {
            if first_cycle {
                m = restart_max;
            } else {
                let cr = absres / absres_prev_cycle.max(SMALL_REAL);
                m = next_restart(cr, m, restart_max);
            }
        }
        absres_prev_cycle = absres;
        first_cycle = false;

        // seed the cycle
        dense::copy(&ws.r, &mut ws.basis[0]);
        dense::scale(1.0 / absres, &mut ws.basis[0]);
        dense::fill(&mut ws.rs, 0.0);
        ws.rs[0] = absres;

        let mut used = 0;
        for j in 0..m {
            if iter >= params.max_iter {
                break;
            }
            iter += 1;

            // expand: w = A M⁻¹ v_j, keeping z_j when the correction needs it
            {
                let zslot: &mut Vec<Precision> = if flexible {
                    &mut ws.zbasis[j]
                } else {
                    &mut ws.z
                };
                pc.apply(&ws.basis[j], zslot)?;
                a.apply(zslot, &mut ws.w)?;
            }

            // modified Gram-Schmidt
            for i in 0..=j {
                let hij = dense::dot(&ws.w, &ws.basis[i]);
                ws.hess[i][j] = hij;
                dense::axpy(-hij, &ws.basis[i], &mut ws.w);
            }
            let h_next = dense::norm2(&ws.w);
            used = j + 1;

            // fold in the previous rotations, then compute this column's
            for i in 0..j {
                let t = ws.cs[i] * ws.hess[i][j] + ws.sn[i] * ws.hess[i + 1][j];
                ws.hess[i + 1][j] = -ws.sn[i] * ws.hess[i][j] + ws.cs[i] * ws.hess[i + 1][j];
                ws.hess[i][j] = t;
            }
            let (c, s) = givens(ws.hess[j][j], h_next);
            ws.cs[j] = c;
            ws.sn[j] = s;
            ws.hess[j][j] = c * ws.hess[j][j] + s * h_next;
            ws.hess[j + 1][j] = 0.0;
            ws.rs[j + 1] = -s * ws.rs[j];
            ws.rs[j] *= c;

            let est = ws.rs[j + 1].abs();
            let absres_old = absres;
            absres = est;
            let est_relres = match params.stop_type {
                StopType::RelModRes => est / xnorm.max(SMALL_REAL),
                _ => est / norm,
            };
            itinfo(
                params.print_level,
                method,
                iter,
                est_relres,
                est,
                est / absres_old.max(SMALL_REAL),
            );

            if h_next < SMALL_REAL {
                // the Krylov space is exhausted: the cycle solution is exact
                pending_claim = true;
                break;
            }
            if est_relres <= params.tol {
                pending_claim = true;
                break;
            }

            dense::copy(&ws.w, &mut ws.basis[j + 1]);
            dense::scale(1.0 / h_next, &mut ws.basis[j + 1]);
        }

        if used == 0 {
            // iteration cap landed exactly on a restart boundary
            continue;
        }

        back_substitute(&ws.hess, &ws.rs, used, &mut ws.y, iter, method)?;

        if flexible {
            // correction from the stored preconditioned basis
            for i in 0..used {
                dense::axpy(ws.y[i], &ws.zbasis[i], x);
            }
        } else {
            // u = V y, then one preconditioner application for x += M⁻¹ u
            dense::fill(&mut ws.w, 0.0);
            for i in 0..used {
                dense::axpy(ws.y[i], &ws.basis[i], &mut ws.w);
            }
            pc.apply(&ws.w, &mut ws.z)?;
            dense::axpy(1.0, &ws.z, x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CooMatrix;
    use crate::precond::Identity;

    fn convection_matrix(n: usize) -> crate::matrix::CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 4.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -2.0));
            }
        }
        CooMatrix::from_triplets(n, n, &triplets).unwrap().to_csr()
    }

    #[test]
    fn test_gmres_nonsymmetric() {
        let n = 80;
        let a = convection_matrix(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let params = SolverParams::default()
            .with_tol(1e-10)
            .with_restart(20)
            .with_max_iter(400);

        let info = gmres(&a, &b, &mut x, &mut Identity, &params).unwrap();
        assert!(info.residual <= 1e-10);

        let mut residual = vec![0.0; n];
        a.apply(&x, &mut residual).unwrap();
        dense::axpby(1.0, &b, -1.0, &mut residual);
        assert!(dense::norm2(&residual) / dense::norm2(&b) <= 1e-9);
    }

    #[test]
    fn test_gmres_converges_within_full_krylov_space() {
        // unrestarted (restart >= n) GMRES is exact in at most n steps
        let n = 12;
        let a = convection_matrix(n);
        let b: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
        let mut x = vec![0.0; n];
        let params = SolverParams::default()
            .with_tol(1e-12)
            .with_restart(n)
            .with_max_iter(3 * n);

        let info = gmres(&a, &b, &mut x, &mut Identity, &params).unwrap();
        assert!(info.iterations <= n + 1);
    }

    #[test]
    fn test_givens_rotation() {
        let (c, s) = givens(3.0, 4.0);
        assert!((c - 0.6).abs() < 1e-15);
        assert!((s - 0.8).abs() < 1e-15);
        // the rotation annihilates the second component
        assert!((-s * 3.0 + c * 4.0).abs() < 1e-15);
    }
}
