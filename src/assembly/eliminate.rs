use crate::error::{AssemblyError, Result};
use crate::Real;
use log::debug;
use nalgebra_sparse::CsrMatrix;

/// Eliminate essential DOFs from an assembled matrix, keeping the existing diagonal entries.
///
/// For every essential DOF `d`, all off-diagonal entries of row `d` are zeroed, together with
/// their symmetric counterparts in column `d`. The diagonal `A[d, d]` is left as assembled, and
/// the sparsity pattern is not modified.
///
/// Columns are reached through the rows of the essential DOFs, so column `d` is only cleared
/// completely for structurally symmetric matrices, which finite element matrices are.
pub fn eliminate_essential_dofs_keep_diagonal<T: Real>(
    matrix: &mut CsrMatrix<T>,
    essential_dofs: &[usize],
) -> Result<()> {
    let num_rows = matrix.nrows();
    if let Some(&dof) = essential_dofs.iter().find(|&&dof| dof >= num_rows) {
        return Err(AssemblyError::verification(format!(
            "essential DOF {} is out of bounds for a matrix with {} rows",
            dof, num_rows
        )));
    }

    let (offsets, cols, values) = matrix.csr_data_mut();
    for &dof in essential_dofs {
        for idx in offsets[dof]..offsets[dof + 1] {
            let col = cols[idx];
            if col == dof {
                continue;
            }
            values[idx] = T::zero();
            if let Some(sym_idx) = (offsets[col]..offsets[col + 1]).find(|&sym_idx| cols[sym_idx] == dof) {
                values[sym_idx] = T::zero();
            }
        }
    }

    debug!("Eliminated {} essential DOFs (diagonal kept)", essential_dofs.len());
    Ok(())
}
