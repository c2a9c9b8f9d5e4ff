//! # Preconditioned Krylov Solvers over Sparse Storage Formats
//!
//! This crate implements the algorithmic core of a sparse-linear-system
//! solver framework: a family of preconditioned Krylov methods driving
//! `A x = b` toward convergence using nothing but sparse matrix-vector
//! products and an opaque preconditioner.
//!
//! ## Key Features
//!
//! - **Nine Krylov cores**: CG, BiCGStab (plus a breakdown-restarting
//!   variant), MinRes, GMRES, variable-restart GMRES, flexible GMRES, GCR,
//!   and GCG, all behind one dispatcher
//! - **Five storage formats**: CSR (plus a row-length-grouped variant),
//!   BSR, COO, structured/banded grids, and block composites, with lossless
//!   conversions between them
//! - **Matrix-free operation**: solvers only ever see an [`Operator`], so a
//!   callback works exactly like a stored matrix
//! - **Flexible preconditioning**: the [`Preconditioner`] contract admits
//!   mutable state, including nested iterative solvers
//!
//! ## Quick Start
//!
//! ```rust
//! use sparsolve::{solve, CooMatrix, SolverKind, SolverParams};
//!
//! // assemble a small SPD system in coordinate form, then compress
//! let matrix = CooMatrix::from_triplets(
//!     2,
//!     2,
//!     &[(0, 0, 5.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 7.0)],
//! )?
//! .to_csr();
//!
//! let b = vec![6.0, 9.0];
//! let mut x = vec![0.0, 0.0];
//!
//! let params = SolverParams::new(SolverKind::Cg).with_tol(1e-10);
//! let info = solve(&matrix, &b, &mut x, None, &params)?;
//!
//! println!("converged in {} iterations", info.iterations);
//! # Ok::<(), sparsolve::SolverError>(())
//! ```
//!
//! ## Methods
//!
//! ### CG / GCG
//! Short-recurrence methods: classical preconditioned CG for SPD systems,
//! and its generalized sibling for mildly non-symmetric problems with an
//! SPD preconditioner.
//!
//! ### BiCGStab family
//! The stabilized bi-conjugate gradient state machine; the variable variant
//! re-seeds the shadow residual instead of failing on breakdown.
//!
//! ### MinRes
//! Three-term Lanczos recurrence for symmetric indefinite systems.
//!
//! ### GMRES family
//! Right-preconditioned restarted GMRES with modified Gram-Schmidt and
//! Givens rotations; the variable variant adapts the restart length from
//! the observed convergence rate, and the flexible variant stores the
//! preconditioned basis so `M` may change every step.
//!
//! ### GCR
//! Generalized conjugate residual with restart and an implicitly tracked,
//! periodically re-measured residual.

#![warn(missing_docs, clippy::all)]
#![allow(clippy::float_cmp)] // Numerical code often requires exact comparisons
#![allow(clippy::needless_range_loop)] // Index-coupled loops over several arrays

// Re-export commonly used types
pub use error::{Result, SolverError};
pub use matrix::{
    csr_add, Band, BlcEntry, BlcMatrix, BlockOrder, BsrMatrix, CooMatrix, CsrMatrix, CsrlMatrix,
    MatFree, MatrixRef, Operator, StrMatrix,
};
pub use precond::{FnPrecond, Identity, Jacobi, Preconditioner};
pub use solver::{
    bicgstab, cg, gcg, gcr, gmres, minres, solve, vbicgstab, vfgmres, vgmres, SolveInfo,
    SolverParams,
};
pub use types::{Index, Precision, PrintLevel, SolverKind, StopType, BIG_REAL, SMALL_REAL};

// Core modules
pub mod dense;
pub mod error;
pub mod matrix;
pub mod precond;
pub mod solver;
pub mod types;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_quick_start_path() {
        let matrix = CooMatrix::from_triplets(
            2,
            2,
            &[(0, 0, 5.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 7.0)],
        )
        .unwrap()
        .to_csr();
        let b = vec![6.0, 9.0];
        let mut x = vec![0.0, 0.0];

        let params = SolverParams::new(SolverKind::Cg).with_tol(1e-10);
        let info = solve(&matrix, &b, &mut x, None, &params).unwrap();
        assert!(info.iterations <= 2);
        // A x = b recovered: x = (33/34, 39/34)
        assert!((x[0] - 33.0 / 34.0).abs() < 1e-8);
        assert!((x[1] - 39.0 / 34.0).abs() < 1e-8);
    }
}
