//! Error types and handling for the solver framework.
//!
//! All failure conditions are reported through a single [`SolverError`] enum;
//! errors are returned, never thrown. Inside a Krylov core the first error
//! aborts the iteration and propagates out through the dispatcher, which does
//! not retry — retry policy belongs to the caller.

use crate::types::Precision;

/// Result type alias for solver operations.
pub type Result<T> = core::result::Result<T, SolverError>;

/// Comprehensive error type for all solver operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    /// Workspace request could not be satisfied, even after shrinking the
    /// restart length where the method allows it.
    #[error("workspace allocation of {requested} reals failed")]
    Alloc {
        /// Number of reals requested when the allocation failed
        requested: usize,
    },

    /// Convergence test still unsatisfied at the iteration cap.
    #[error("{method} reached {iterations} iterations without converging \
             (residual {residual:.3e}, tolerance {tolerance:.3e})")]
    MaxIter {
        /// Method that ran out of iterations
        method: &'static str,
        /// Number of iterations performed
        iterations: usize,
        /// Final relative residual achieved
        residual: Precision,
        /// Target tolerance that was not reached
        tolerance: Precision,
    },

    /// Method-specific numerical breakdown, e.g. a BiCGStab denominator
    /// collapsing to zero.
    #[error("{method} broke down at iteration {iteration}: {reason}")]
    Breakdown {
        /// Method that broke down
        method: &'static str,
        /// Iteration at which the breakdown was detected
        iteration: usize,
        /// Which quantity collapsed
        reason: String,
    },

    /// Residual failed to decrease over the stagnation window.
    #[error("{method} stagnated at iteration {iteration} \
             (residual {residual:.3e})")]
    Stagnation {
        /// Method that stagnated
        method: &'static str,
        /// Iteration at which stagnation was declared
        iteration: usize,
        /// Relative residual when stagnation was declared
        residual: Precision,
    },

    /// Residual grew beyond a bounded multiple of the initial residual.
    #[error("{method} diverged at iteration {iteration} \
             (residual {residual:.3e})")]
    Diverge {
        /// Method that diverged
        method: &'static str,
        /// Iteration at which divergence was detected
        iteration: usize,
        /// Relative residual when divergence was detected
        residual: Precision,
    },

    /// The dispatcher does not recognize the requested solver kind.
    #[error("unknown solver kind '{name}'")]
    SolverType {
        /// The unrecognized name
        name: String,
    },

    /// Invalid solver parameter (non-positive tolerance, zero restart, ...).
    #[error("invalid parameter '{parameter}': {message}")]
    InputParam {
        /// Name of the offending parameter
        parameter: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// Invalid matrix structure discovered at construction or kernel entry.
    #[error("invalid matrix structure: {reason}")]
    Format {
        /// Description of the structural violation
        reason: String,
    },

    /// Dimension mismatch between matrix and vector operands.
    #[error("dimension mismatch in {operation}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Operation where the mismatch occurred
        operation: &'static str,
        /// Expected dimension
        expected: usize,
        /// Actual dimension found
        actual: usize,
    },
}

impl SolverError {
    /// Check if this error indicates a recoverable condition.
    ///
    /// Recoverable errors can potentially be resolved by adjusting solver
    /// parameters or switching methods; the others indicate caller mistakes
    /// or system limits.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SolverError::MaxIter { .. } => true,
            SolverError::Breakdown { .. } => true,
            SolverError::Stagnation { .. } => true,
            SolverError::Diverge { .. } => true,
            SolverError::Alloc { .. } => false,
            SolverError::SolverType { .. } => false,
            SolverError::InputParam { .. } => false,
            SolverError::Format { .. } => false,
            SolverError::DimensionMismatch { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recoverability() {
        let maxiter = SolverError::MaxIter {
            method: "CG",
            iterations: 100,
            residual: 1e-3,
            tolerance: 1e-6,
        };
        assert!(maxiter.is_recoverable());

        let mismatch = SolverError::DimensionMismatch {
            operation: "matvec",
            expected: 100,
            actual: 50,
        };
        assert!(!mismatch.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = SolverError::Breakdown {
            method: "BiCGStab",
            iteration: 7,
            reason: "omega denominator near zero".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("BiCGStab"));
        assert!(msg.contains("iteration 7"));
    }
}
