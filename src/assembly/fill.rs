use crate::assembly::traversal::{for_each_row_slot, Traversal};
use crate::error::{AssemblyError, Result};
use crate::kernel::ElementValues;
use crate::options::AssemblyOptions;
use crate::Real;
use log::debug;
use paradis::{ParallelIndexedAccess, ParallelIndexedCollection};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Write the column indices and values of every row into storage sized by the count pass.
///
/// Entries within a row are stored in claim order, which depends on thread scheduling.
pub(crate) fn fill_entries<T: Real>(
    traversal: &Traversal,
    values: &ElementValues<T>,
    row_offsets: &[usize],
    options: &AssemblyOptions,
) -> Result<(Vec<usize>, Vec<T>)> {
    let num_rows = row_offsets.len() - 1;
    let nnz = row_offsets[num_rows];
    let mut col_indices = vec![0usize; nnz];
    let mut data = vec![T::zero(); nnz];

    let cursors: Vec<_> = row_offsets[..num_rows]
        .iter()
        .map(|&offset| AtomicUsize::new(offset))
        .collect();

    {
        // Every slot index is handed out by exactly one fetch_add, so writes are disjoint
        let col_access = unsafe { col_indices.as_mut_slice().create_access() };
        let data_access = unsafe { data.as_mut_slice().create_access() };

        for_each_row_slot(traversal, options, |element, row_slot| {
            traversal.visit_row_slot(element, row_slot, |entry| {
                let value = traversal.entry_value(&entry, element, row_slot, values)?;
                let row = entry.row.index();
                let slot = cursors[row].fetch_add(1, Ordering::Relaxed);
                if slot >= row_offsets[row + 1] {
                    return Err(AssemblyError::WriteBudgetExceeded { row });
                }
                // slot < row_offsets[num_rows] == nnz
                unsafe {
                    *col_access.get_unchecked_mut(slot) = entry.col.index();
                    *data_access.get_unchecked_mut(slot) = value;
                }
                Ok(())
            })
        })?;
    }

    if let Some(row) = (0..num_rows).find(|&row| cursors[row].load(Ordering::Relaxed) != row_offsets[row + 1]) {
        return Err(AssemblyError::verification(format!(
            "fill pass wrote {} entries to row {}, but {} were reserved",
            cursors[row].load(Ordering::Relaxed) - row_offsets[row],
            row,
            row_offsets[row + 1] - row_offsets[row]
        )));
    }

    debug!("Fill pass finished: {} nonzeros written", nnz);
    Ok((col_indices, data))
}
