//! The preconditioner contract consumed by every Krylov core.
//!
//! A preconditioner applies an approximate inverse: `z ← M⁻¹ r`. The receiver
//! is mutable because flexible methods (VFGMRES, GCR) explicitly permit the
//! operator to change between applications — a nested iterative solver is a
//! legitimate preconditioner. Real preconditioner setup (AMG, ILU, Schwarz)
//! lives outside this crate; only the trivial diagonal pair ships here.

use crate::error::{Result, SolverError};
use crate::matrix::CsrMatrix;
use crate::types::{Precision, SMALL_REAL};

/// Opaque operator applying an approximate inverse: `z ← M⁻¹ r`.
pub trait Preconditioner {
    /// Apply the preconditioner, writing the result into `z`.
    fn apply(&mut self, r: &[Precision], z: &mut [Precision]) -> Result<()>;
}

/// Adapter turning a closure into a preconditioner; the hook for nested
/// solvers and test doubles.
pub struct FnPrecond<F>(pub F);

impl<F> Preconditioner for FnPrecond<F>
where
    F: FnMut(&[Precision], &mut [Precision]) -> Result<()>,
{
    fn apply(&mut self, r: &[Precision], z: &mut [Precision]) -> Result<()> {
        (self.0)(r, z)
    }
}

/// Identity preconditioner: `z ← r`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Preconditioner for Identity {
    fn apply(&mut self, r: &[Precision], z: &mut [Precision]) -> Result<()> {
        if r.len() != z.len() {
            return Err(SolverError::DimensionMismatch {
                operation: "identity preconditioner",
                expected: r.len(),
                actual: z.len(),
            });
        }
        z.copy_from_slice(r);
        Ok(())
    }
}

/// Jacobi (diagonal scaling) preconditioner: `z ← D⁻¹ r`.
#[derive(Debug, Clone)]
pub struct Jacobi {
    inv_diag: Vec<Precision>,
}

impl Jacobi {
    /// Build from an explicit diagonal; rejects zero entries.
    pub fn new(diag: &[Precision]) -> Result<Self> {
        let mut inv_diag = Vec::with_capacity(diag.len());
        for (i, &d) in diag.iter().enumerate() {
            if d.abs() < SMALL_REAL {
                return Err(SolverError::Format {
                    reason: format!("zero diagonal entry at position {}", i),
                });
            }
            inv_diag.push(1.0 / d);
        }
        Ok(Self { inv_diag })
    }

    /// Build from the diagonal of a CSR matrix.
    pub fn from_csr(a: &CsrMatrix) -> Result<Self> {
        Self::new(&a.diagonal())
    }
}

impl Preconditioner for Jacobi {
    fn apply(&mut self, r: &[Precision], z: &mut [Precision]) -> Result<()> {
        if r.len() != self.inv_diag.len() || z.len() != self.inv_diag.len() {
            return Err(SolverError::DimensionMismatch {
                operation: "Jacobi preconditioner",
                expected: self.inv_diag.len(),
                actual: r.len(),
            });
        }
        for ((zi, &ri), &di) in z.iter_mut().zip(r.iter()).zip(self.inv_diag.iter()) {
            *zi = ri * di;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let mut m = Identity;
        let r = vec![1.0, -2.0, 3.0];
        let mut z = vec![0.0; 3];
        m.apply(&r, &mut z).unwrap();
        assert_eq!(z, r);
    }

    #[test]
    fn test_jacobi_scaling() {
        let mut m = Jacobi::new(&[2.0, 4.0, 0.5]).unwrap();
        let r = vec![2.0, 4.0, 0.5];
        let mut z = vec![0.0; 3];
        m.apply(&r, &mut z).unwrap();
        assert_eq!(z, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_jacobi_rejects_zero_diagonal() {
        assert!(matches!(
            Jacobi::new(&[1.0, 0.0]),
            Err(SolverError::Format { .. })
        ));
    }

    #[test]
    fn test_closure_preconditioner() {
        // a wrapped closure doubling the residual counts as a preconditioner
        let mut scale2 = FnPrecond(|r: &[Precision], z: &mut [Precision]| -> Result<()> {
            for (zi, &ri) in z.iter_mut().zip(r.iter()) {
                *zi = 2.0 * ri;
            }
            Ok(())
        });
        let r = vec![1.0, 2.0];
        let mut z = vec![0.0; 2];
        scale2.apply(&r, &mut z).unwrap();
        assert_eq!(z, vec![2.0, 4.0]);
    }
}
