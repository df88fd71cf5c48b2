//! Local sparsity templates.
//!
//! All elements of one discretization kind share the same local sparsity: row slot `r` of an
//! element couples to at most `nnz_per_row` column slots, and the `k`-th candidate nonzero
//! of row `r` is either a local column slot or absent.
use crate::error::{AssemblyError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSparsity {
    dofs_per_element: usize,
    nnz_per_row: usize,
    /// Column slot of candidate `k` in row `r`, stored at `nnz_per_row * r + k`.
    mapping: Vec<Option<usize>>,
}

impl LocalSparsity {
    /// Construct a template from its row-major candidate table.
    pub fn try_from_mapping(
        dofs_per_element: usize,
        nnz_per_row: usize,
        mapping: Vec<Option<usize>>,
    ) -> Result<Self> {
        if mapping.len() != dofs_per_element * nnz_per_row {
            return Err(AssemblyError::verification(format!(
                "sparsity mapping has {} entries, expected {} x {}",
                mapping.len(),
                dofs_per_element,
                nnz_per_row
            )));
        }
        if let Some(col) = mapping.iter().flatten().find(|&&col| col >= dofs_per_element) {
            return Err(AssemblyError::verification(format!(
                "sparsity mapping references local column {} of an element with {} DOFs",
                col, dofs_per_element
            )));
        }
        for row in 0..dofs_per_element {
            let mut cols: Vec<_> = mapping[nnz_per_row * row..nnz_per_row * (row + 1)]
                .iter()
                .flatten()
                .collect();
            cols.sort_unstable();
            if cols.windows(2).any(|w| w[0] == w[1]) {
                return Err(AssemblyError::verification(format!(
                    "local row {} of the sparsity mapping lists a column twice",
                    row
                )));
            }
        }
        Ok(Self {
            dofs_per_element,
            nnz_per_row,
            mapping,
        })
    }

    /// Every local row couples to every local column, with candidate `k` being column `k`.
    pub fn dense(dofs_per_element: usize) -> Self {
        let mapping = (0..dofs_per_element)
            .flat_map(|_| (0..dofs_per_element).map(Some))
            .collect();
        Self {
            dofs_per_element,
            nnz_per_row: dofs_per_element,
            mapping,
        }
    }

    /// The nearest-neighbor stencil of a tensor-product grid of `(order + 1)^dim` nodes.
    ///
    /// Nodes are numbered lexicographically (the first coordinate runs fastest). Each node
    /// couples to the `3^dim` nodes whose grid coordinates differ from its own by at most one
    /// in every direction; candidate `k` enumerates the offsets lexicographically in
    /// `{-1, 0, 1}^dim`. Offsets leaving the grid are absent.
    pub fn tensor_stencil(dim: usize, order: usize) -> Self {
        let n1d = order + 1;
        let dofs_per_element = n1d.pow(dim as u32);
        let nnz_per_row = 3usize.pow(dim as u32);
        let mut mapping = Vec::with_capacity(dofs_per_element * nnz_per_row);

        let mut node_coords = vec![0usize; dim];
        let mut offsets = vec![0usize; dim];
        for row in 0..dofs_per_element {
            lexicographic_coords(row, n1d, &mut node_coords);
            for k in 0..nnz_per_row {
                // Offsets are stored shifted by one, i.e. in {0, 1, 2}
                lexicographic_coords(k, 3, &mut offsets);
                let mut col = 0;
                let mut stride = 1;
                let mut inside = true;
                for (&x, &dx) in node_coords.iter().zip(&offsets) {
                    let y = x + dx;
                    if y < 1 || y > n1d {
                        inside = false;
                        break;
                    }
                    col += (y - 1) * stride;
                    stride *= n1d;
                }
                mapping.push(if inside { Some(col) } else { None });
            }
        }

        Self {
            dofs_per_element,
            nnz_per_row,
            mapping,
        }
    }

    pub fn dofs_per_element(&self) -> usize {
        self.dofs_per_element
    }

    pub fn nnz_per_row(&self) -> usize {
        self.nnz_per_row
    }

    pub fn mapping(&self) -> &[Option<usize>] {
        &self.mapping
    }

    /// The local column slot of candidate `k` of a row, or `None` if absent.
    #[inline]
    pub fn column(&self, row_slot: usize, k: usize) -> Option<usize> {
        self.mapping[self.nnz_per_row * row_slot + k]
    }

    /// The present `(k, column slot)` candidates of a row.
    #[inline]
    pub fn row_columns(&self, row_slot: usize) -> impl '_ + Iterator<Item = (usize, usize)> {
        let begin = self.nnz_per_row * row_slot;
        self.mapping[begin..begin + self.nnz_per_row]
            .iter()
            .enumerate()
            .filter_map(|(k, col)| col.map(|col| (k, col)))
    }

    /// Reverse lookup: the candidate index `k` of a row holding the given column slot.
    #[inline]
    pub fn find_slot(&self, row_slot: usize, col_slot: usize) -> Option<usize> {
        let begin = self.nnz_per_row * row_slot;
        self.mapping[begin..begin + self.nnz_per_row]
            .iter()
            .position(|&col| col == Some(col_slot))
    }

    /// Total number of present candidates over all rows.
    pub fn num_present(&self) -> usize {
        self.mapping.iter().flatten().count()
    }
}

/// Decompose a lexicographic index into grid coordinates, the first coordinate running fastest.
pub(crate) fn lexicographic_coords(mut index: usize, n1d: usize, coords: &mut [usize]) {
    for c in coords.iter_mut() {
        *c = index % n1d;
        index /= n1d;
    }
}
