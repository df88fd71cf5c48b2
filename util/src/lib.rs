use nalgebra::{DMatrix, Scalar};
use nalgebra_sparse::CsrMatrix;

/// Assert the structural CSR invariants: offsets start at zero, are non-decreasing and end at
/// the number of nonzeros, and no row lists a column twice.
pub fn assert_csr_invariants<T: Scalar>(matrix: &CsrMatrix<T>) {
    let offsets = matrix.row_offsets();
    assert_eq!(offsets.len(), matrix.nrows() + 1);
    assert_eq!(offsets[0], 0);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "Row offsets must be non-decreasing");
    assert_eq!(offsets[matrix.nrows()], matrix.col_indices().len());
    assert_eq!(matrix.col_indices().len(), matrix.values().len());

    for (i, row) in matrix.row_iter().enumerate() {
        let mut cols = row.col_indices().to_vec();
        cols.sort_unstable();
        let num_cols = cols.len();
        cols.dedup();
        assert_eq!(cols.len(), num_cols, "Row {} contains duplicate columns", i);
    }
}

/// The `(col, value)` pairs of every row, sorted by column.
///
/// Comparing these compares the rows of two matrices as sets, independent of the order in which
/// entries are stored within a row.
pub fn sorted_row_entries<T: Scalar + Copy>(matrix: &CsrMatrix<T>) -> Vec<Vec<(usize, T)>> {
    matrix
        .row_iter()
        .map(|row| {
            let mut entries: Vec<_> = row.col_indices().iter().copied().zip(row.values().iter().copied()).collect();
            entries.sort_by_key(|&(col, _)| col);
            entries
        })
        .collect()
}

/// The stored positions of a matrix as a dense boolean mask.
pub fn structure_mask<T: Scalar>(matrix: &CsrMatrix<T>) -> DMatrix<bool> {
    let mut mask = DMatrix::repeat(matrix.nrows(), matrix.ncols(), false);
    for (i, j, _) in matrix.triplet_iter() {
        mask[(i, j)] = true;
    }
    mask
}
