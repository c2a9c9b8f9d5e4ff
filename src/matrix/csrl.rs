//! CSR storage with cached row-length groups (CSRL).
//!
//! Rows are permuted so that all rows with the same nonzero count sit in one
//! contiguous group; the mat-vec then runs each group with a fixed inner trip
//! count, which keeps the hot loop free of per-row bookkeeping.

use crate::error::Result;
use crate::matrix::{check_dims, CsrMatrix, Operator};
use crate::types::{Index, Precision};

/// One group of rows sharing the same nonzero count.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct RowGroup {
    /// Nonzeros per row in this group
    len: usize,
    /// First position of this group in the row permutation
    rows_start: usize,
    /// One past the last position of this group in the row permutation
    rows_end: usize,
    /// First position of this group's entries in `ja`/`val`
    entries_start: usize,
}

/// Sparse matrix in row-length-grouped CSR format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsrlMatrix {
    /// Number of rows
    pub nrow: Index,
    /// Number of columns
    pub ncol: Index,
    /// Original row index of each permuted position
    rows: Vec<Index>,
    /// Length groups, ascending by row length
    groups: Vec<RowGroup>,
    /// Column indices, group-major
    ja: Vec<Index>,
    /// Entry values, group-major
    val: Vec<Precision>,
}

impl CsrlMatrix {
    /// Build the grouped form of a CSR matrix.
    pub fn from_csr(a: &CsrMatrix) -> Self {
        let mut order: Vec<Index> = (0..a.nrow).collect();
        order.sort_by_key(|&i| a.ia[i + 1] - a.ia[i]);

        let mut rows = Vec::with_capacity(a.nrow);
        let mut groups: Vec<RowGroup> = Vec::new();
        let mut ja = Vec::with_capacity(a.nnz());
        let mut val = Vec::with_capacity(a.nnz());

        for &i in &order {
            let len = a.ia[i + 1] - a.ia[i];
            match groups.last_mut() {
                Some(g) if g.len == len => g.rows_end += 1,
                _ => groups.push(RowGroup {
                    len,
                    rows_start: rows.len(),
                    rows_end: rows.len() + 1,
                    entries_start: ja.len(),
                }),
            }
            rows.push(i);
            ja.extend_from_slice(&a.ja[a.ia[i]..a.ia[i + 1]]);
            val.extend_from_slice(&a.val[a.ia[i]..a.ia[i + 1]]);
        }

        Self {
            nrow: a.nrow,
            ncol: a.ncol,
            rows,
            groups,
            ja,
            val,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.val.len()
    }

    /// Number of distinct row lengths.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Operator for CsrlMatrix {
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
        for g in &self.groups {
            let len = g.len;
            let mut entry = g.entries_start;
            for pos in g.rows_start..g.rows_end {
                let mut sum = 0.0;
                for k in entry..entry + len {
                    sum += self.val[k] * x[self.ja[k]];
                }
                let i = self.rows[pos];
                y[i] = alpha * sum + beta * y[i];
                entry += len;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrl_matches_csr() {
        // rows of lengths 2, 1, 2, 3
        let a = CsrMatrix::new(
            4,
            4,
            vec![0, 2, 3, 5, 8],
            vec![0, 2, 1, 0, 3, 0, 1, 2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        )
        .unwrap();
        let grouped = CsrlMatrix::from_csr(&a);

        assert_eq!(grouped.nnz(), a.nnz());
        assert_eq!(grouped.group_count(), 3);

        let x = vec![1.0, -1.0, 2.0, 0.5];
        let mut y_csr = vec![0.0; 4];
        let mut y_csrl = vec![0.0; 4];
        a.apply(&x, &mut y_csr).unwrap();
        grouped.apply(&x, &mut y_csrl).unwrap();
        assert_eq!(y_csr, y_csrl);
    }

    #[test]
    fn test_csrl_empty_rows() {
        // one empty row grouped at the front
        let a = CsrMatrix::new(3, 3, vec![0, 0, 1, 2], vec![0, 2], vec![2.0, 5.0]).unwrap();
        let grouped = CsrlMatrix::from_csr(&a);

        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![9.0; 3];
        grouped.apply(&x, &mut y).unwrap();
        assert_eq!(y, vec![0.0, 2.0, 5.0]);
    }
}
