//! Block composite (BLC) storage for saddle-point and coupled systems.
//!
//! A two-dimensional grid of sub-matrix handles; each cell borrows a CSR or
//! BSR matrix, or is empty. The mat-vec dispatches every non-empty cell to
//! its own kernel over partial views of `x` and `y`.

use crate::error::{Result, SolverError};
use crate::matrix::{check_dims, BsrMatrix, CsrMatrix, Operator};
use crate::types::{Index, Precision};

/// One cell of a [`BlcMatrix`]: a borrowed sub-matrix.
#[derive(Clone, Copy)]
pub enum BlcEntry<'a> {
    /// CSR sub-block
    Csr(&'a CsrMatrix),
    /// BSR sub-block
    Bsr(&'a BsrMatrix),
}

impl BlcEntry<'_> {
    fn as_operator(&self) -> &dyn Operator {
        match self {
            BlcEntry::Csr(m) => *m,
            BlcEntry::Bsr(m) => *m,
        }
    }
}

/// Block composite matrix over borrowed sub-matrices.
pub struct BlcMatrix<'a> {
    /// Number of block rows
    pub brow: Index,
    /// Number of block columns
    pub bcol: Index,
    /// Starting offset of each block row in the assembled vector, length `brow + 1`
    row_offsets: Vec<Index>,
    /// Starting offset of each block column, length `bcol + 1`
    col_offsets: Vec<Index>,
    /// Row-major cell grid, length `brow * bcol`
    blocks: Vec<Option<BlcEntry<'a>>>,
}

impl<'a> BlcMatrix<'a> {
    /// Assemble a composite matrix from partition sizes and a row-major cell
    /// grid. Every non-empty cell must match its partition's dimensions.
    pub fn new(
        row_sizes: &[Index],
        col_sizes: &[Index],
        blocks: Vec<Option<BlcEntry<'a>>>,
    ) -> Result<Self> {
        let brow = row_sizes.len();
        let bcol = col_sizes.len();
        if blocks.len() != brow * bcol {
            return Err(SolverError::Format {
                reason: format!(
                    "BLC grid holds {} cells, expected {}x{}",
                    blocks.len(),
                    brow,
                    bcol
                ),
            });
        }

        let mut row_offsets = vec![0; brow + 1];
        for (i, &s) in row_sizes.iter().enumerate() {
            row_offsets[i + 1] = row_offsets[i] + s;
        }
        let mut col_offsets = vec![0; bcol + 1];
        for (j, &s) in col_sizes.iter().enumerate() {
            col_offsets[j + 1] = col_offsets[j] + s;
        }

        for i in 0..brow {
            for j in 0..bcol {
                if let Some(cell) = &blocks[i * bcol + j] {
                    let op = cell.as_operator();
                    if op.nrows() != row_sizes[i] || op.ncols() != col_sizes[j] {
                        return Err(SolverError::Format {
                            reason: format!(
                                "BLC cell ({}, {}) is {}x{}, partition expects {}x{}",
                                i,
                                j,
                                op.nrows(),
                                op.ncols(),
                                row_sizes[i],
                                col_sizes[j]
                            ),
                        });
                    }
                }
            }
        }

        Ok(Self {
            brow,
            bcol,
            row_offsets,
            col_offsets,
            blocks,
        })
    }

    /// The cell at block position `(i, j)`.
    pub fn block(&self, i: Index, j: Index) -> Option<&BlcEntry<'a>> {
        self.blocks[i * self.bcol + j].as_ref()
    }
}

impl Operator for BlcMatrix<'_> {
    fn nrows(&self) -> usize {
        self.row_offsets[self.brow]
    }

    fn ncols(&self) -> usize {
        self.col_offsets[self.bcol]
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
        if beta == 0.0 {
            y.fill(0.0);
        } else if beta != 1.0 {
            for yi in y.iter_mut() {
                *yi *= beta;
            }
        }
        for i in 0..self.brow {
            let ys = &mut y[self.row_offsets[i]..self.row_offsets[i + 1]];
            for j in 0..self.bcol {
                if let Some(cell) = &self.blocks[i * self.bcol + j] {
                    let xs = &x[self.col_offsets[j]..self.col_offsets[j + 1]];
                    cell.as_operator().apply_axpby(alpha, xs, 1.0, ys)?;
                }
            }
        }
        Ok(())
    }
}
