//! Common types and type aliases used throughout the solver.
//!
//! This module defines the scalar types, the solver/stop/print enumerations
//! that make up the iterative-parameter record, and the numerical sentinels
//! shared by every Krylov core.

use core::fmt;
use core::str::FromStr;

use crate::error::SolverError;

/// Floating-point precision type.
///
/// Currently fixed to f64 for numerical stability, but may be
/// parameterized in future versions for memory optimization.
pub type Precision = f64;

/// Integer type for array indices, dimensions, and counts.
pub type Index = usize;

/// Tolerance floor: quantities with magnitude below this are treated as zero
/// in breakdown tests and normalizer fallbacks.
pub const SMALL_REAL: Precision = 1e-20;

/// Upper sentinel for residual guards; anything beyond this is garbage.
pub const BIG_REAL: Precision = 1e20;

/// Iterative method selected by the solver dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverKind {
    /// Preconditioned conjugate gradient (SPD systems)
    Cg,
    /// Preconditioned BiCGStab
    BiCgStab,
    /// BiCGStab with shadow-vector restart on breakdown
    VBiCgStab,
    /// Preconditioned minimal residual (symmetric indefinite systems)
    MinRes,
    /// Right-preconditioned restarted GMRES
    Gmres,
    /// GMRES with adaptive restart length
    VGmres,
    /// Flexible GMRES with adaptive restart length
    VFGmres,
    /// Preconditioned generalized conjugate residual
    Gcr,
    /// Preconditioned generalized conjugate gradient
    Gcg,
}

impl SolverKind {
    /// Short method name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SolverKind::Cg => "CG",
            SolverKind::BiCgStab => "BiCGStab",
            SolverKind::VBiCgStab => "VBiCGStab",
            SolverKind::MinRes => "MinRes",
            SolverKind::Gmres => "GMRES",
            SolverKind::VGmres => "VGMRES",
            SolverKind::VFGmres => "VFGMRES",
            SolverKind::Gcr => "GCR",
            SolverKind::Gcg => "GCG",
        }
    }

    /// Whether this method uses a restart length.
    pub fn uses_restart(&self) -> bool {
        matches!(
            self,
            SolverKind::Gmres | SolverKind::VGmres | SolverKind::VFGmres | SolverKind::Gcr
        )
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cg" => Ok(SolverKind::Cg),
            "bicgstab" => Ok(SolverKind::BiCgStab),
            "vbicgstab" => Ok(SolverKind::VBiCgStab),
            "minres" => Ok(SolverKind::MinRes),
            "gmres" => Ok(SolverKind::Gmres),
            "vgmres" => Ok(SolverKind::VGmres),
            "vfgmres" => Ok(SolverKind::VFGmres),
            "gcr" => Ok(SolverKind::Gcr),
            "gcg" => Ok(SolverKind::Gcg),
            _ => Err(SolverError::SolverType {
                name: s.to_string(),
            }),
        }
    }
}

/// Convergence test applied by every Krylov core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopType {
    /// `‖r‖₂ / ‖b‖₂ ≤ tol` (falls back to `‖r₀‖₂` when `‖b‖₂ = 0`)
    RelRes,
    /// `√⟨r, M⁻¹r⟩ / ‖b‖_M⁻¹ ≤ tol`
    RelPrecRes,
    /// `‖r‖₂ / max(ε, ‖x‖₂) ≤ tol`
    RelModRes,
}

impl fmt::Display for StopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopType::RelRes => write!(f, "relative residual"),
            StopType::RelPrecRes => write!(f, "relative preconditioned residual"),
            StopType::RelModRes => write!(f, "relative modified residual"),
        }
    }
}

/// How much the solver reports while running.
///
/// The `log` facade still filters what reaches the sink; this level gates
/// which records are emitted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrintLevel {
    /// No output from the solver
    None,
    /// One-line summary on exit
    Min,
    /// Summary plus per-iteration residual records
    Some,
    /// Everything, including restart and safeguard notices
    More,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_kind_parsing() {
        assert_eq!("cg".parse::<SolverKind>().unwrap(), SolverKind::Cg);
        assert_eq!("GMRES".parse::<SolverKind>().unwrap(), SolverKind::Gmres);
        assert_eq!(
            "vfgmres".parse::<SolverKind>().unwrap(),
            SolverKind::VFGmres
        );

        let err = "sor".parse::<SolverKind>().unwrap_err();
        assert!(matches!(err, SolverError::SolverType { .. }));
    }

    #[test]
    fn test_restart_family() {
        assert!(SolverKind::Gmres.uses_restart());
        assert!(SolverKind::Gcr.uses_restart());
        assert!(!SolverKind::Cg.uses_restart());
        assert!(!SolverKind::MinRes.uses_restart());
    }

    #[test]
    fn test_print_level_ordering() {
        assert!(PrintLevel::None < PrintLevel::Min);
        assert!(PrintLevel::Min < PrintLevel::Some);
        assert!(PrintLevel::Some < PrintLevel::More);
    }
}
