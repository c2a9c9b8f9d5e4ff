//! Coordinate (COO) storage format.
//!
//! Parallel row/column/value arrays. Used mainly as a conversion way-point;
//! the scatter-add kernel is provided so COO-held data can still drive a
//! solve directly.

use crate::error::{Result, SolverError};
use crate::matrix::{check_dims, CsrMatrix, Operator};
use crate::types::{Index, Precision};

/// Sparse matrix in coordinate (triplet) format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CooMatrix {
    /// Number of rows
    pub nrow: Index,
    /// Number of columns
    pub ncol: Index,
    /// Row index of each entry
    pub rowind: Vec<Index>,
    /// Column index of each entry
    pub colind: Vec<Index>,
    /// Entry values
    pub val: Vec<Precision>,
}

impl CooMatrix {
    /// Create a COO matrix from parallel index/value arrays.
    pub fn new(
        nrow: Index,
        ncol: Index,
        rowind: Vec<Index>,
        colind: Vec<Index>,
        val: Vec<Precision>,
    ) -> Result<Self> {
        let m = Self {
            nrow,
            ncol,
            rowind,
            colind,
            val,
        };
        m.validate()?;
        Ok(m)
    }

    /// Create a COO matrix from `(row, col, value)` triplets.
    pub fn from_triplets(
        nrow: Index,
        ncol: Index,
        triplets: &[(Index, Index, Precision)],
    ) -> Result<Self> {
        let rowind = triplets.iter().map(|t| t.0).collect();
        let colind = triplets.iter().map(|t| t.1).collect();
        let val = triplets.iter().map(|t| t.2).collect();
        Self::new(nrow, ncol, rowind, colind, val)
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.val.len()
    }

    /// Check the structural invariants, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.rowind.len() != self.val.len() || self.colind.len() != self.val.len() {
            return Err(SolverError::Format {
                reason: format!(
                    "COO index/value arrays disagree: {} rows, {} cols, {} values",
                    self.rowind.len(),
                    self.colind.len(),
                    self.val.len()
                ),
            });
        }
        for (k, (&i, &j)) in self.rowind.iter().zip(self.colind.iter()).enumerate() {
            if i >= self.nrow || j >= self.ncol {
                return Err(SolverError::Format {
                    reason: format!(
                        "COO entry {} at ({}, {}) outside {}x{} shape",
                        k, i, j, self.nrow, self.ncol
                    ),
                });
            }
        }
        Ok(())
    }

    /// Convert to CSR by the count/scatter/shift scheme.
    ///
    /// Duplicate `(i, j)` entries are retained, not summed, and the columns
    /// within each result row keep their COO encounter order — they are not
    /// sorted. Consumers that need sorted rows call
    /// [`CsrMatrix::sort_rows`] explicitly.
    pub fn to_csr(&self) -> CsrMatrix {
        let nnz = self.nnz();
        let mut ia = vec![0usize; self.nrow + 1];
        let mut ja = vec![0usize; nnz];
        let mut val = vec![0.0; nnz];

        // count entries per row
        for &i in &self.rowind {
            ia[i + 1] += 1;
        }
        // prefix sum gives row starts
        for i in 0..self.nrow {
            ia[i + 1] += ia[i];
        }
        // scatter, advancing each row cursor as it fills
        for k in 0..nnz {
            let i = self.rowind[k];
            let dest = ia[i];
            ja[dest] = self.colind[k];
            val[dest] = self.val[k];
            ia[i] += 1;
        }
        // restore row pointers by shifting back one slot
        for i in (1..=self.nrow).rev() {
            ia[i] = ia[i - 1];
        }
        ia[0] = 0;

        CsrMatrix {
            nrow: self.nrow,
            ncol: self.ncol,
            ia,
            ja,
            val,
        }
    }

    /// Extract the stored entries as `(row, col, value)` triplets.
    pub fn to_triplets(&self) -> Vec<(Index, Index, Precision)> {
        self.rowind
            .iter()
            .zip(self.colind.iter())
            .zip(self.val.iter())
            .map(|((&i, &j), &v)| (i, j, v))
            .collect()
    }
}

impl Operator for CooMatrix {
    fn nrows(&self) -> usize {
        self.nrow
    }

    fn ncols(&self) -> usize {
        self.ncol
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
        check_dims(self.nrow, self.ncol, x, y)?;
        if beta == 0.0 {
            y.fill(0.0);
        } else if beta != 1.0 {
            for yi in y.iter_mut() {
                *yi *= beta;
            }
        }
        // scatter-add, single pass
        for k in 0..self.val.len() {
            y[self.rowind[k]] += alpha * self.val[k] * x[self.colind[k]];
        }
        Ok(())
    }
}
