//! Compressed sparse row (CSR) storage format.
//!
//! The workhorse format: row-pointer/column-index/value arrays. Kernels make
//! no assumption about column order within a row, and duplicate columns are
//! permitted (their contributions simply accumulate).

use crate::error::{Result, SolverError};
use crate::matrix::{check_dims, CooMatrix, Operator};
use crate::types::{Index, Precision};

/// Sparse matrix in compressed sparse row format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsrMatrix {
    /// Number of rows
    pub nrow: Index,
    /// Number of columns
    pub ncol: Index,
    /// Row pointers, length `nrow + 1`
    pub ia: Vec<Index>,
    /// Column indices, length `nnz`
    pub ja: Vec<Index>,
    /// Entry values, length `nnz`
    pub val: Vec<Precision>,
}

impl CsrMatrix {
    /// Create a CSR matrix from raw arrays, validating the invariants.
    pub fn new(
        nrow: Index,
        ncol: Index,
        ia: Vec<Index>,
        ja: Vec<Index>,
        val: Vec<Precision>,
    ) -> Result<Self> {
        let m = Self {
            nrow,
            ncol,
            ia,
            ja,
            val,
        };
        m.validate()?;
        Ok(m)
    }

    /// Create an identity matrix of the given size.
    pub fn identity(n: Index) -> Self {
        Self {
            nrow: n,
            ncol: n,
            ia: (0..=n).collect(),
            ja: (0..n).collect(),
            val: vec![1.0; n],
        }
    }

    /// Create a diagonal matrix from the given diagonal values.
    pub fn from_diagonal(diag: &[Precision]) -> Self {
        let n = diag.len();
        Self {
            nrow: n,
            ncol: n,
            ia: (0..=n).collect(),
            ja: (0..n).collect(),
            val: diag.to_vec(),
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.val.len()
    }

    /// Check the structural invariants, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.ia.len() != self.nrow + 1 {
            return Err(SolverError::Format {
                reason: format!(
                    "CSR row pointer length {} does not match nrow {} + 1",
                    self.ia.len(),
                    self.nrow
                ),
            });
        }
        if self.ia[0] != 0 {
            return Err(SolverError::Format {
                reason: format!("CSR row pointers must start at 0, found {}", self.ia[0]),
            });
        }
        if self.ja.len() != self.val.len() {
            return Err(SolverError::Format {
                reason: format!(
                    "CSR index/value arrays disagree: {} indices, {} values",
                    self.ja.len(),
                    self.val.len()
                ),
            });
        }
        if self.ia[self.nrow] != self.val.len() {
            return Err(SolverError::Format {
                reason: format!(
                    "CSR last row pointer {} does not match nnz {}",
                    self.ia[self.nrow],
                    self.val.len()
                ),
            });
        }
        for i in 0..self.nrow {
            if self.ia[i] > self.ia[i + 1] {
                return Err(SolverError::Format {
                    reason: format!("CSR row pointers decrease at row {}", i),
                });
            }
        }
        for (k, &j) in self.ja.iter().enumerate() {
            if j >= self.ncol {
                return Err(SolverError::Format {
                    reason: format!(
                        "CSR column index {} at position {} outside {} columns",
                        j, k, self.ncol
                    ),
                });
            }
        }
        Ok(())
    }

    /// Get the entry at `(row, col)`, summing duplicates; `None` if absent.
    pub fn get(&self, row: Index, col: Index) -> Option<Precision> {
        if row >= self.nrow {
            return None;
        }
        let mut sum = 0.0;
        let mut found = false;
        for k in self.ia[row]..self.ia[row + 1] {
            if self.ja[k] == col {
                sum += self.val[k];
                found = true;
            }
        }
        found.then_some(sum)
    }

    /// Extract the main diagonal; absent diagonal entries yield zero.
    pub fn diagonal(&self) -> Vec<Precision> {
        let n = self.nrow.min(self.ncol);
        let mut diag = vec![0.0; n];
        for i in 0..n {
            for k in self.ia[i]..self.ia[i + 1] {
                if self.ja[k] == i {
                    diag[i] += self.val[k];
                }
            }
        }
        diag
    }

    /// Sort the entries of each row by column index.
    pub fn sort_rows(&mut self) {
        let mut perm: Vec<usize> = Vec::new();
        for i in 0..self.nrow {
            let (start, end) = (self.ia[i], self.ia[i + 1]);
            perm.clear();
            perm.extend(start..end);
            perm.sort_by_key(|&k| self.ja[k]);

            let ja_sorted: Vec<Index> = perm.iter().map(|&k| self.ja[k]).collect();
            let val_sorted: Vec<Precision> = perm.iter().map(|&k| self.val[k]).collect();
            self.ja[start..end].copy_from_slice(&ja_sorted);
            self.val[start..end].copy_from_slice(&val_sorted);
        }
    }

    /// Transpose by the count/prefix/scatter scheme.
    pub fn transpose(&self) -> CsrMatrix {
        let nnz = self.nnz();
        let mut ia_t = vec![0usize; self.ncol + 1];
        let mut ja_t = vec![0usize; nnz];
        let mut val_t = vec![0.0; nnz];

        // count entries per transposed row (= column of self)
        for &j in &self.ja {
            ia_t[j + 1] += 1;
        }
        for j in 0..self.ncol {
            ia_t[j + 1] += ia_t[j];
        }
        for i in 0..self.nrow {
            for k in self.ia[i]..self.ia[i + 1] {
                let j = self.ja[k];
                let dest = ia_t[j];
                ja_t[dest] = i;
                val_t[dest] = self.val[k];
                ia_t[j] += 1;
            }
        }
        for j in (1..=self.ncol).rev() {
            ia_t[j] = ia_t[j - 1];
        }
        ia_t[0] = 0;

        CsrMatrix {
            nrow: self.ncol,
            ncol: self.nrow,
            ia: ia_t,
            ja: ja_t,
            val: val_t,
        }
    }

    /// Convert to coordinate format.
    pub fn to_coo(&self) -> CooMatrix {
        let nnz = self.nnz();
        let mut rowind = Vec::with_capacity(nnz);
        for i in 0..self.nrow {
            for _ in self.ia[i]..self.ia[i + 1] {
                rowind.push(i);
            }
        }
        CooMatrix {
            nrow: self.nrow,
            ncol: self.ncol,
            rowind,
            colind: self.ja.clone(),
            val: self.val.clone(),
        }
    }

    /// Row-parallel mat-vec: `y ← A·x` using the rayon worker pool.
    ///
    /// Per-row reductions stay serial, so results match the serial kernel
    /// exactly; only the row order is parallelized.
    #[cfg(feature = "parallel")]
    pub fn apply_parallel(&self, x: &[Precision], y: &mut [Precision]) -> Result<()> {
        use rayon::prelude::*;

        check_dims(self.nrow, self.ncol, x, y)?;
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            let mut sum = 0.0;
            for k in self.ia[i]..self.ia[i + 1] {
                sum += self.val[k] * x[self.ja[k]];
            }
            *yi = sum;
        });
        Ok(())
    }
}

impl Operator for CsrMatrix {
    fn nrows(&self) -> usize {
        self.nrow
    }

    fn ncols(&self) -> usize {
        self.ncol
    }

    fn apply(&self, x: &[Precision], y: &mut [Precision]) -> Result<()> {
        check_dims(self.nrow, self.ncol, x, y)?;
        for i in 0..self.nrow {
            let mut sum = 0.0;
            for k in self.ia[i]..self.ia[i + 1] {
                sum += self.val[k] * x[self.ja[k]];
            }
            y[i] = sum;
        }
        Ok(())
    }

    fn apply_axpby(
        &self,
        alpha: Precision,
        x: &[Precision],
        beta: Precision,
        y: &mut [Precision],
    ) -> Result<()> {
        check_dims(self.nrow, self.ncol, x, y)?;
        for i in 0..self.nrow {
            let mut sum = 0.0;
            for k in self.ia[i]..self.ia[i + 1] {
                sum += self.val[k] * x[self.ja[k]];
            }
            y[i] = alpha * sum + beta * y[i];
        }
        Ok(())
    }
}

/// Structural-union sum `a + α·b` into a newly allocated CSR.
///
/// Column indices appear at most once per result row with summed values;
/// input rows are gathered and sorted first so the two-pointer merge sees
/// ordered columns.
pub fn csr_add(a: &CsrMatrix, alpha: Precision, b: &CsrMatrix) -> Result<CsrMatrix> {
    if a.nrow != b.nrow || a.ncol != b.ncol {
        return Err(SolverError::DimensionMismatch {
            operation: "csr_add",
            expected: a.nrow,
            actual: b.nrow,
        });
    }

    let mut ia = vec![0usize; a.nrow + 1];
    let mut ja = Vec::new();
    let mut val = Vec::new();
    let mut row_a: Vec<(Index, Precision)> = Vec::new();
    let mut row_b: Vec<(Index, Precision)> = Vec::new();

    for i in 0..a.nrow {
        gather_sorted_row(a, i, &mut row_a);
        gather_sorted_row(b, i, &mut row_b);

        // two-pointer merge of the sorted rows
        let (mut p, mut q) = (0, 0);
        while p < row_a.len() || q < row_b.len() {
            let take_a = q >= row_b.len() || (p < row_a.len() && row_a[p].0 <= row_b[q].0);
            let take_b = p >= row_a.len() || (q < row_b.len() && row_b[q].0 <= row_a[p].0);
            let col = if take_a { row_a[p].0 } else { row_b[q].0 };
            let mut v = 0.0;
            if take_a {
                v += row_a[p].1;
                p += 1;
            }
            if take_b && (!take_a || col == row_b[q].0) {
                v += alpha * row_b[q].1;
                q += 1;
            }
            ja.push(col);
            val.push(v);
        }
        ia[i + 1] = ja.len();
    }

    Ok(CsrMatrix {
        nrow: a.nrow,
        ncol: a.ncol,
        ia,
        ja,
        val,
    })
}

/// Collect one row as sorted `(col, value)` pairs with duplicates summed.
fn gather_sorted_row(m: &CsrMatrix, i: Index, out: &mut Vec<(Index, Precision)>) {
    out.clear();
    for k in m.ia[i]..m.ia[i + 1] {
        out.push((m.ja[k], m.val[k]));
    }
    out.sort_by_key(|e| e.0);
    out.dedup_by(|next, prev| {
        if next.0 == prev.0 {
            prev.1 += next.1;
            true
        } else {
            false
        }
    });
}
