//! Flexible GMRES with an adaptive restart length.
//!
//! Stores the preconditioned basis vectors `z_j = M⁻¹ v_j` and assembles the
//! correction from them directly, so the preconditioner is free to change
//! from step to step — a nested iterative solver is a legitimate `M`. The
//! restart length adapts between cycles exactly as in
//! [`vgmres`](crate::solver::vgmres).

use crate::error::Result;
use crate::matrix::Operator;
use crate::precond::Preconditioner;
use crate::solver::gmres::gmres_driver;
use crate::solver::{SolveInfo, SolverParams};
use crate::types::Precision;

/// Solve `A x = b` by flexible variable-restart GMRES.
pub fn vfgmres(
    a: &dyn Operator,
    b: &[Precision],
    x: &mut [Precision],
    pc: &mut dyn Preconditioner,
    params: &SolverParams,
) -> Result<SolveInfo> {
    gmres_driver(a, b, x, pc, params, true, true, "VFGMRES")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense;
    use crate::error::Result;
    use crate::matrix::{CooMatrix, CsrMatrix, Operator};
    use crate::precond::{FnPrecond, Identity};
    use crate::solver::cg::cg;
    use crate::solver::SolverParams;
    use crate::types::{Precision, SolverKind};

    fn laplacian(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
        }
        CooMatrix::from_triplets(n, n, &triplets).unwrap().to_csr()
    }

    #[test]
    fn test_vfgmres_with_nested_iterative_preconditioner() {
        // an inner CG run as preconditioner: not a fixed linear operator,
        // exactly what the flexible variant exists for
        let n = 60;
        let a = laplacian(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];

        let inner_params = SolverParams::new(SolverKind::Cg)
            .with_tol(1e-2)
            .with_max_iter(10);
        let a_ref = &a;
        let mut nested = FnPrecond(move |r: &[Precision], z: &mut [Precision]| -> Result<()> {
            z.fill(0.0);
            // a loose inner solve is fine; failure to converge is expected
            let _ = cg(a_ref, r, z, &mut Identity, &inner_params);
            Ok(())
        });

        let params = SolverParams::new(SolverKind::VFGmres)
            .with_tol(1e-9)
            .with_restart(20)
            .with_max_iter(500);
        let info = vfgmres(&a, &b, &mut x, &mut nested, &params).unwrap();
        assert!(info.residual <= 1e-9);

        let mut residual = vec![0.0; n];
        a.apply(&x, &mut residual).unwrap();
        dense::axpby(1.0, &b, -1.0, &mut residual);
        assert!(dense::norm2(&residual) / dense::norm2(&b) <= 1e-8);
    }

    #[test]
    fn test_vfgmres_identity_preconditioner_matches_plain() {
        let n = 40;
        let a = laplacian(n);
        let b: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).cos()).collect();
        let mut x = vec![0.0; n];
        let params = SolverParams::new(SolverKind::VFGmres)
            .with_tol(1e-10)
            .with_restart(15)
            .with_max_iter(1000);

        let info = vfgmres(&a, &b, &mut x, &mut Identity, &params).unwrap();
        assert!(info.residual <= 1e-10);
    }
}
