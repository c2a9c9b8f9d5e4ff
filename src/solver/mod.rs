//! Preconditioned Krylov iteration cores and the solver dispatcher.
//!
//! Each submodule holds one iteration core; they all consume the same
//! [`Operator`](crate::matrix::Operator) + [`Preconditioner`] pair and share
//! the stopping machinery defined here. The [`solve`] entry point routes a
//! parameter record to the selected core, times the solve, and emits the
//! one-line outcome summary.

use std::time::Instant;

use log::{debug, info};

use crate::dense;
use crate::error::{Result, SolverError};
use crate::matrix::Operator;
use crate::precond::{Identity, Preconditioner};
use crate::types::{Precision, PrintLevel, SolverKind, StopType, SMALL_REAL};

pub mod bicgstab;
pub mod cg;
pub mod fgmres;
pub mod gcg;
pub mod gcr;
pub mod gmres;
pub mod minres;
pub mod vgmres;

pub use bicgstab::{bicgstab, vbicgstab};
pub use cg::cg;
pub use fgmres::vfgmres;
pub use gcg::gcg;
pub use gcr::gcr;
pub use gmres::gmres;
pub use minres::minres;
pub use vgmres::vgmres;

/// Consecutive safeguard restarts tolerated before declaring stagnation.
pub(crate) const MAX_STAG: usize = 20;

/// Relative residual beyond which the iteration is ruled divergent.
pub(crate) const DIVERGE_RATIO: Precision = 1e6;

/// Smallest restart length the adaptive policy will select.
pub(crate) const RESTART_MIN: usize = 3;

/// Solution-change floor below which an unconverged iteration is suspected
/// of stagnating.
pub(crate) const STAG_RATIO: Precision = 1e-4;

/// Parameter record controlling one solver invocation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverParams {
    /// Iterative method to run
    pub kind: SolverKind,
    /// Convergence test
    pub stop_type: StopType,
    /// Output verbosity
    pub print_level: PrintLevel,
    /// Iteration cap
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: Precision,
    /// Restart length (GMRES family and GCR)
    pub restart: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            kind: SolverKind::Cg,
            stop_type: StopType::RelRes,
            print_level: PrintLevel::None,
            max_iter: 1000,
            tol: 1e-6,
            restart: 30,
        }
    }
}

impl SolverParams {
    /// Default parameters for the given method.
    pub fn new(kind: SolverKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Set the convergence tolerance.
    pub fn with_tol(mut self, tol: Precision) -> Self {
        self.tol = tol;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the restart length.
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }

    /// Set the convergence test.
    pub fn with_stop_type(mut self, stop_type: StopType) -> Self {
        self.stop_type = stop_type;
        self
    }

    /// Set the output verbosity.
    pub fn with_print_level(mut self, print_level: PrintLevel) -> Self {
        self.print_level = print_level;
        self
    }

    /// Check parameter sanity, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if !(self.tol > 0.0) || !self.tol.is_finite() {
            return Err(SolverError::InputParam {
                parameter: "tol",
                message: format!("must be positive and finite, got {}", self.tol),
            });
        }
        if self.kind.uses_restart() && self.restart < 1 {
            return Err(SolverError::InputParam {
                parameter: "restart",
                message: format!("{} requires restart >= 1, got {}", self.kind, self.restart),
            });
        }
        Ok(())
    }
}

/// Outcome of a converged solve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveInfo {
    /// Iterations performed
    pub iterations: usize,
    /// Final relative residual under the requested stopping test
    pub residual: Precision,
}

/// Solve `A x = b` with the method selected by `params`.
///
/// `x` carries the initial guess in and the solution out. When no
/// preconditioner is supplied the identity is used. The solve is timed and,
/// at `print_level >= Min`, a one-line summary of the outcome is emitted
/// through the `log` facade.
pub fn solve(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: Option<&mut dyn Preconditioner>,
    params: &SolverParams,
) -> Result<SolveInfo> {
    params.validate()?;
    if a.nrows() != a.ncols() {
        return Err(SolverError::InputParam {
            parameter: "matrix",
            message: format!("solver requires a square operator, got {}x{}", a.nrows(), a.ncols()),
        });
    }
    if b.len() != a.nrows() {
        return Err(SolverError::DimensionMismatch {
            operation: "right-hand side",
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    if x.len() != a.ncols() {
        return Err(SolverError::DimensionMismatch {
            operation: "initial guess",
            expected: a.ncols(),
            actual: x.len(),
        });
    }

    let mut identity = Identity;
    let pc: &mut dyn Preconditioner = match pc {
        Some(p) => p,
        None => &mut identity,
    };

    let start = Instant::now();
    let outcome = match params.kind {
        SolverKind::Cg => cg::cg(a, b, x, pc, params),
        SolverKind::BiCgStab => bicgstab::bicgstab(a, b, x, pc, params),
        SolverKind::VBiCgStab => bicgstab::vbicgstab(a, b, x, pc, params),
        SolverKind::MinRes => minres::minres(a, b, x, pc, params),
        SolverKind::Gmres => gmres::gmres(a, b, x, pc, params),
        SolverKind::VGmres => vgmres::vgmres(a, b, x, pc, params),
        SolverKind::VFGmres => fgmres::vfgmres(a, b, x, pc, params),
        SolverKind::Gcr => gcr::gcr(a, b, x, pc, params),
        SolverKind::Gcg => gcg::gcg(a, b, x, pc, params),
    };
    let elapsed = start.elapsed();

    if params.print_level >= PrintLevel::Min {
        match &outcome {
            Ok(info) => info!(
                "{} converged in {} iterations, residual {:.6e}, {:.3} ms",
                params.kind,
                info.iterations,
                info.residual,
                elapsed.as_secs_f64() * 1e3
            ),
            Err(err) => info!(
                "{} failed after {:.3} ms: {}",
                params.kind,
                elapsed.as_secs_f64() * 1e3,
                err
            ),
        }
    }
    outcome
}

/// Allocate a zeroed workspace vector, mapping allocation failure to the
/// solver error taxonomy instead of aborting.
pub(crate) fn try_workspace(n: usize) -> Result<Vec<Precision>> {
    let mut v: Vec<Precision> = Vec::new();
    if v.try_reserve_exact(n).is_err() {
        return Err(SolverError::Alloc { requested: n });
    }
    v.resize(n, 0.0);
    Ok(v)
}

/// Compute the denominator of the requested stopping test.
///
/// `scratch` must have the length of `b`; it is clobbered. The fallback to
/// the initial residual norm covers `‖b‖ = 0`.
pub(crate) fn stop_normalizer(
    stop: StopType,
    b: &[Precision],
    absres0: Precision,
    pc: &mut dyn Preconditioner,
    scratch: &mut [Precision],
) -> Result<Precision> {
    let norm = match stop {
        StopType::RelRes | StopType::RelModRes => dense::norm2(b),
        StopType::RelPrecRes => {
            pc.apply(b, scratch)?;
            dense::dot(b, scratch).abs().sqrt()
        }
    };
    Ok(if norm > SMALL_REAL {
        norm
    } else {
        absres0.max(SMALL_REAL)
    })
}

/// Numerator of the stopping test for the current residual.
///
/// For `RelPrecRes` this applies the preconditioner into `scratch`; the
/// other tests just use the 2-norm already at hand.
pub(crate) fn stop_resnorm(
    stop: StopType,
    r: &[Precision],
    absres: Precision,
    pc: &mut dyn Preconditioner,
    scratch: &mut [Precision],
) -> Result<Precision> {
    match stop {
        StopType::RelPrecRes => {
            pc.apply(r, scratch)?;
            Ok(dense::dot(r, scratch).abs().sqrt())
        }
        _ => Ok(absres),
    }
}

/// Relative residual under the requested stopping test.
pub(crate) fn relative_residual(
    stop: StopType,
    resnorm: Precision,
    normalizer: Precision,
    xnorm: Precision,
) -> Precision {
    match stop {
        StopType::RelModRes => resnorm / xnorm.max(SMALL_REAL),
        _ => resnorm / normalizer,
    }
}

/// Emit one per-iteration progress record.
pub(crate) fn itinfo(
    level: PrintLevel,
    method: &str,
    iter: usize,
    relres: Precision,
    absres: Precision,
    factor: Precision,
) {
    if level >= PrintLevel::Some {
        debug!(
            "{} iter {:>5} | relres {:.6e} | absres {:.6e} | factor {:.4}",
            method, iter, relres, absres, factor
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;

    #[test]
    fn test_param_validation() {
        let bad_tol = SolverParams::new(SolverKind::Cg).with_tol(0.0);
        assert!(matches!(
            bad_tol.validate(),
            Err(SolverError::InputParam { parameter: "tol", .. })
        ));

        let bad_restart = SolverParams::new(SolverKind::Gmres).with_restart(0);
        assert!(matches!(
            bad_restart.validate(),
            Err(SolverError::InputParam { parameter: "restart", .. })
        ));

        // restart irrelevant outside the restart family
        let cg = SolverParams::new(SolverKind::Cg).with_restart(0);
        assert!(cg.validate().is_ok());
    }

    #[test]
    fn test_dispatcher_rejects_bad_shapes() {
        let a = CsrMatrix::identity(3);
        let b = vec![1.0; 2];
        let mut x = vec![0.0; 3];
        let params = SolverParams::default();
        assert!(matches!(
            solve(&a, &b, &mut x, None, &params),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_relative_residual_modres_floor() {
        // zero solution norm falls back to the tolerance floor
        let rel = relative_residual(StopType::RelModRes, 1.0, 1.0, 0.0);
        assert!(rel.is_finite());
        assert!(rel > 1.0);
    }
}
