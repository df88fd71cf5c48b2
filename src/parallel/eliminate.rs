use crate::error::{AssemblyError, Result};
use crate::options::ColumnElimination;
use crate::parallel::comm::{CommTag, Communicator};
use crate::parallel::matrix::ParCsrMatrix;
use crate::Real;
use bytemuck::Pod;
use log::debug;

impl<T: Real + Pod> ParCsrMatrix<T> {
    /// Eliminate essential DOFs across all ranks, placing a unit entry on their diagonal.
    /// Collective.
    ///
    /// `essential_rows` are indices of owned rows, relative to [`first_row`](Self::first_row).
    /// Afterwards, every row and column of an essential DOF is zero, except for the diagonal
    /// entry, which is one. Off-diagonal columns referring to essential DOFs of other ranks are
    /// cleared once the exchange of essential markers has completed.
    pub fn eliminate_essential_dofs<C: Communicator>(
        &mut self,
        comm: &C,
        essential_rows: &[usize],
        strategy: ColumnElimination,
    ) -> Result<()> {
        let n_local = self.num_local_rows();
        if let Some(&row) = essential_rows.iter().find(|&&row| row >= n_local) {
            return Err(AssemblyError::verification(format!(
                "essential row {} is out of bounds for rank {} with {} rows",
                row,
                self.rank(),
                n_local
            )));
        }

        let mut eliminate_row = vec![0u8; n_local];
        for &row in essential_rows {
            eliminate_row[row] = 1;
        }
        let exchange = self
            .comm_pkg()
            .start_exchange(comm, CommTag::ELIMINATION, &eliminate_row)?;

        let (diag, offd) = self.blocks_mut();
        {
            let (offsets, cols, values) = diag.csr_data_mut();
            for &row in essential_rows {
                for idx in offsets[row]..offsets[row + 1] {
                    let col = cols[idx];
                    if col == row {
                        values[idx] = T::one();
                        continue;
                    }
                    values[idx] = T::zero();
                    if let Some(sym_idx) = (offsets[col]..offsets[col + 1]).find(|&sym_idx| cols[sym_idx] == row) {
                        values[sym_idx] = T::zero();
                    }
                }
            }
        }
        {
            let (offsets, _, values) = offd.csr_data_mut();
            for &row in essential_rows {
                values[offsets[row]..offsets[row + 1]].fill(T::zero());
            }
        }

        let eliminate_col = exchange.wait()?;
        let eliminated_cols: Vec<usize> = eliminate_col
            .iter()
            .enumerate()
            .filter_map(|(col, &flag)| if flag != 0 { Some(col) } else { None })
            .collect();

        let (offsets, cols, values) = offd.csr_data_mut();
        match strategy {
            ColumnElimination::Scan => {
                for &col in &eliminated_cols {
                    for row in 0..n_local {
                        if let Some(idx) = (offsets[row]..offsets[row + 1]).find(|&idx| cols[idx] == col) {
                            values[idx] = T::zero();
                        }
                    }
                }
            }
            ColumnElimination::BinarySearch => {
                // Collected in increasing order, so already sorted
                for (idx, col) in cols.iter().enumerate() {
                    if eliminated_cols.binary_search(col).is_ok() {
                        values[idx] = T::zero();
                    }
                }
            }
        }

        debug!(
            "Rank {} eliminated {} owned rows and {} off-diagonal columns",
            self.rank(),
            essential_rows.len(),
            eliminated_cols.len()
        );
        Ok(())
    }
}
