//! Structured/banded (STR) storage for regular-grid discretizations.
//!
//! Describes a regular 3-D grid of `nx · ny · nz` points with `nc` unknowns
//! per point: a mandatory block diagonal plus any number of off-diagonal
//! bands, each identified by its grid-stride offset from the diagonal. Bands
//! are clipped at the grid boundary, and a band whose offset magnitude
//! reaches `ngrid` couples nothing at all and is treated as empty.

use crate::error::{Result, SolverError};
use crate::matrix::{check_dims, Operator};
use crate::types::{Index, Precision};

/// One off-diagonal band of an [`StrMatrix`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Band {
    /// Grid-stride distance from the diagonal; never zero
    pub offset: isize,
    /// Dense `nc × nc` blocks, `(ngrid − |offset|)` of them, row-major
    pub val: Vec<Precision>,
}

/// Sparse matrix in structured/banded format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StrMatrix {
    /// Grid extent in x
    pub nx: Index,
    /// Grid extent in y
    pub ny: Index,
    /// Grid extent in z
    pub nz: Index,
    /// Unknowns per grid point
    pub nc: Index,
    /// Total grid points, `nx · ny · nz`
    pub ngrid: Index,
    /// Main-diagonal blocks, `ngrid` of them, row-major
    pub diag: Vec<Precision>,
    /// Off-diagonal bands
    pub bands: Vec<Band>,
}

impl StrMatrix {
    /// Create a structured matrix, validating sizes and band offsets.
    pub fn new(
        nx: Index,
        ny: Index,
        nz: Index,
        nc: Index,
        diag: Vec<Precision>,
        bands: Vec<Band>,
    ) -> Result<Self> {
        let m = Self {
            nx,
            ny,
            nz,
            nc,
            ngrid: nx * ny * nz,
            diag,
            bands,
        };
        m.validate()?;
        Ok(m)
    }

    /// Check the structural invariants, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.nc == 0 {
            return Err(SolverError::Format {
                reason: "STR component count must be positive".to_string(),
            });
        }
        if self.diag.len() != self.ngrid * self.nc * self.nc {
            return Err(SolverError::Format {
                reason: format!(
                    "STR diagonal holds {} reals, expected {} blocks of {}x{}",
                    self.diag.len(),
                    self.ngrid,
                    self.nc,
                    self.nc
                ),
            });
        }
        for (k, band) in self.bands.iter().enumerate() {
            if band.offset == 0 {
                return Err(SolverError::Format {
                    reason: format!("STR band {} has zero offset", k),
                });
            }
            if self
                .bands
                .iter()
                .skip(k + 1)
                .any(|other| other.offset == band.offset)
            {
                return Err(SolverError::Format {
                    reason: format!("STR offset {} appears more than once", band.offset),
                });
            }
            let reach = band.offset.unsigned_abs();
            let expected = self.ngrid.saturating_sub(reach) * self.nc * self.nc;
            if band.val.len() != expected {
                return Err(SolverError::Format {
                    reason: format!(
                        "STR band with offset {} holds {} reals, expected {}",
                        band.offset,
                        band.val.len(),
                        expected
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Operator for StrMatrix {
    fn nrows(&self) -> usize {
        self.ngrid * self.nc
    }

    fn ncols(&self) -> usize {
        self.ngrid * self.nc
    }

    fn apply(&self, x: &[Precision], y: &mut [Precision]) -> Result<()> {
        self.apply_axpby(1.0, x, 0.0, y)
    }

    fn apply_axpby(
        &self,
        alpha: Precision,
        x: &[Precision],
        beta: Precision,
        y: &mut [Precision],
    ) -> Result<()> {
        let n = self.nrows();
        check_dims(n, n, x, y)?;
        let nc = self.nc;
        let nc2 = nc * nc;

        if beta == 0.0 {
            y.fill(0.0);
        } else if beta != 1.0 {
            for yi in y.iter_mut() {
                *yi *= beta;
            }
        }

        // stream the main diagonal
        for g in 0..self.ngrid {
            let block = &self.diag[g * nc2..(g + 1) * nc2];
            let xs = &x[g * nc..(g + 1) * nc];
            for r in 0..nc {
                let mut sum = 0.0;
                for (c, &xc) in xs.iter().enumerate() {
                    sum += block[r * nc + c] * xc;
                }
                y[g * nc + r] += alpha * sum;
            }
        }

        // then each band, clipped at the boundary
        for band in &self.bands {
            let reach = band.offset.unsigned_abs();
            if reach >= self.ngrid {
                continue;
            }
            let count = self.ngrid - reach;
            // rows start at `reach` for sub-diagonal bands, 0 otherwise
            let first_row = if band.offset < 0 { reach } else { 0 };
            for idx in 0..count {
                let g = first_row + idx;
                let h = (g as isize + band.offset) as usize;
                let block = &band.val[idx * nc2..(idx + 1) * nc2];
                let xs = &x[h * nc..(h + 1) * nc];
                for r in 0..nc {
                    let mut sum = 0.0;
                    for (c, &xc) in xs.iter().enumerate() {
                        sum += block[r * nc + c] * xc;
                    }
                    y[g * nc + r] += alpha * sum;
                }
            }
        }
        Ok(())
    }
}
