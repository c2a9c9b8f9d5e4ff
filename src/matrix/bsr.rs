//! Block compressed sparse row (BSR) storage format.
//!
//! Same row/column structure as CSR, but each stored entry is a dense
//! `nb × nb` block. Blocks may be laid out row-major or column-major inside
//! `val`, selected by [`BlockOrder`]; the kernels honor either layout.

use crate::error::{Result, SolverError};
use crate::matrix::{check_dims, CsrMatrix, Operator};
use crate::types::{Index, Precision};

/// Dense layout of each `nb × nb` block inside the value array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockOrder {
    /// Block entry `(r, c)` lives at `r * nb + c`
    RowMajor,
    /// Block entry `(r, c)` lives at `c * nb + r`
    ColMajor,
}

/// Sparse matrix in block compressed sparse row format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BsrMatrix {
    /// Number of block rows
    pub brow: Index,
    /// Number of block columns
    pub bcol: Index,
    /// Block dimension
    pub nb: Index,
    /// Dense layout of each block
    pub order: BlockOrder,
    /// Block-row pointers, length `brow + 1`
    pub ia: Vec<Index>,
    /// Block-column indices, length `nnzb`
    pub ja: Vec<Index>,
    /// Block values, length `nnzb * nb * nb`
    pub val: Vec<Precision>,
}

impl BsrMatrix {
    /// Create a BSR matrix from raw arrays, validating the invariants.
    pub fn new(
        brow: Index,
        bcol: Index,
        nb: Index,
        order: BlockOrder,
        ia: Vec<Index>,
        ja: Vec<Index>,
        val: Vec<Precision>,
    ) -> Result<Self> {
        let m = Self {
            brow,
            bcol,
            nb,
            order,
            ia,
            ja,
            val,
        };
        m.validate()?;
        Ok(m)
    }

    /// Number of stored blocks.
    pub fn nnzb(&self) -> usize {
        self.ja.len()
    }

    /// Check the structural invariants, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.nb == 0 {
            return Err(SolverError::Format {
                reason: "BSR block dimension must be positive".to_string(),
            });
        }
        if self.ia.len() != self.brow + 1 || self.ia[0] != 0 {
            return Err(SolverError::Format {
                reason: format!(
                    "BSR row pointer array malformed (length {}, first {})",
                    self.ia.len(),
                    self.ia.first().copied().unwrap_or(0)
                ),
            });
        }
        if self.ia[self.brow] != self.ja.len() {
            return Err(SolverError::Format {
                reason: format!(
                    "BSR last row pointer {} does not match block count {}",
                    self.ia[self.brow],
                    self.ja.len()
                ),
            });
        }
        if self.val.len() != self.ja.len() * self.nb * self.nb {
            return Err(SolverError::Format {
                reason: format!(
                    "BSR value array holds {} reals, expected {} blocks of {}x{}",
                    self.val.len(),
                    self.ja.len(),
                    self.nb,
                    self.nb
                ),
            });
        }
        for i in 0..self.brow {
            if self.ia[i] > self.ia[i + 1] {
                return Err(SolverError::Format {
                    reason: format!("BSR row pointers decrease at block row {}", i),
                });
            }
        }
        if let Some(&j) = self.ja.iter().find(|&&j| j >= self.bcol) {
            return Err(SolverError::Format {
                reason: format!("BSR block column {} outside grid of {} columns", j, self.bcol),
            });
        }
        Ok(())
    }

    #[inline]
    fn block_entry(&self, block: usize, r: usize, c: usize) -> Precision {
        let base = block * self.nb * self.nb;
        match self.order {
            BlockOrder::RowMajor => self.val[base + r * self.nb + c],
            BlockOrder::ColMajor => self.val[base + c * self.nb + r],
        }
    }

    /// Build a BSR matrix from CSR, given a block dimension dividing both
    /// logical sizes. The conversion is lossless: every position of a block
    /// that holds at least one CSR entry is materialized, zeros included.
    pub fn from_csr(a: &CsrMatrix, nb: Index, order: BlockOrder) -> Result<Self> {
        if nb == 0 || a.nrow % nb != 0 || a.ncol % nb != 0 {
            return Err(SolverError::Format {
                reason: format!(
                    "block dimension {} does not divide {}x{} matrix",
                    nb, a.nrow, a.ncol
                ),
            });
        }
        let brow = a.nrow / nb;
        let bcol = a.ncol / nb;

        let mut ia = vec![0usize; brow + 1];
        let mut ja: Vec<Index> = Vec::new();
        let mut val: Vec<Precision> = Vec::new();
        // block column -> position in the current block row
        let mut slot = vec![usize::MAX; bcol];

        for bi in 0..brow {
            let row_blocks_start = ja.len();
            for r in 0..nb {
                let i = bi * nb + r;
                for k in a.ia[i]..a.ia[i + 1] {
                    let j = a.ja[k];
                    let bj = j / nb;
                    let c = j % nb;
                    let block = if slot[bj] == usize::MAX {
                        slot[bj] = ja.len();
                        ja.push(bj);
                        val.resize(val.len() + nb * nb, 0.0);
                        slot[bj]
                    } else {
                        slot[bj]
                    };
                    let base = block * nb * nb;
                    let pos = match order {
                        BlockOrder::RowMajor => base + r * nb + c,
                        BlockOrder::ColMajor => base + c * nb + r,
                    };
                    val[pos] += a.val[k];
                }
            }
            for &bj in &ja[row_blocks_start..] {
                slot[bj] = usize::MAX;
            }
            ia[bi + 1] = ja.len();
        }

        Ok(Self {
            brow,
            bcol,
            nb,
            order,
            ia,
            ja,
            val,
        })
    }

    /// Expand to CSR. Every stored block position becomes a CSR entry,
    /// zeros included, so the conversion round-trips losslessly.
    pub fn to_csr(&self) -> CsrMatrix {
        let nb = self.nb;
        let nrow = self.brow * nb;
        let mut ia = vec![0usize; nrow + 1];
        let mut ja = Vec::with_capacity(self.nnzb() * nb * nb);
        let mut val = Vec::with_capacity(self.nnzb() * nb * nb);

        for bi in 0..self.brow {
            for r in 0..nb {
                for k in self.ia[bi]..self.ia[bi + 1] {
                    let bj = self.ja[k];
                    for c in 0..nb {
                        ja.push(bj * nb + c);
                        val.push(self.block_entry(k, r, c));
                    }
                }
                ia[bi * nb + r + 1] = ja.len();
            }
        }

        CsrMatrix {
            nrow,
            ncol: self.bcol * nb,
            ia,
            ja,
            val,
        }
    }
}

impl Operator for BsrMatrix {
    fn nrows(&self) -> usize {
        self.brow * self.nb
    }

    fn ncols(&self) -> usize {
        self.bcol * self.nb
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
        check_dims(self.nrows(), self.ncols(), x, y)?;
        let nb = self.nb;
        if beta == 0.0 {
            y.fill(0.0);
        } else if beta != 1.0 {
            for yi in y.iter_mut() {
                *yi *= beta;
            }
        }
        for bi in 0..self.brow {
            for k in self.ia[bi]..self.ia[bi + 1] {
                let bj = self.ja[k];
                let xs = &x[bj * nb..(bj + 1) * nb];
                for r in 0..nb {
                    let mut sum = 0.0;
                    for (c, &xc) in xs.iter().enumerate() {
                        sum += self.block_entry(k, r, c) * xc;
                    }
                    y[bi * nb + r] += alpha * sum;
                }
            }
        }
        Ok(())
    }
}
