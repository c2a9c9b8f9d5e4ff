//! GMRES with an adaptive restart length.
//!
//! Between restart cycles the convergence rate `cr = ‖r_k‖ / ‖r_{k-1}‖`
//! (cycle to cycle) steers the next restart: a rate near one keeps the
//! largest subspace, a very small rate keeps the current length, and the
//! middle ground shrinks the restart a little at a time, resetting to the
//! maximum once it would drop below the floor.

use crate::error::Result;
use crate::matrix::Operator;
use crate::precond::Preconditioner;
use crate::solver::gmres::gmres_driver;
use crate::solver::{SolveInfo, SolverParams, RESTART_MIN};
use crate::types::Precision;

/// Rate above which the cycle is treated as needing the full subspace.
const CR_MAX: Precision = 0.99;

/// Rate below which the current restart is already paying off.
const CR_MIN: Precision = 0.174;

/// Step by which the restart length shrinks.
const RESTART_STEP: usize = 3;

/// Solve `A x = b` by variable-restart right-preconditioned GMRES.
pub fn vgmres(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    gmres_driver(a, b, x, pc, params, true, false, "VGMRES")
}

/// Restart length for the next cycle given the observed rate.
pub(crate) fn next_restart(cr: Precision, current: usize, max: usize) -> usize {
    if cr > CR_MAX {
        max
    } else if cr < CR_MIN {
        current
    } else if current >= RESTART_MIN + RESTART_STEP {
        current - RESTART_STEP
    } else {
        max
    }
}
