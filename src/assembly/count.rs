use crate::assembly::traversal::{for_each_row_slot, Traversal};
use crate::error::Result;
use crate::options::AssemblyOptions;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Count the number of distinct entries of every global row.
pub(crate) fn count_row_entries(traversal: &Traversal, options: &AssemblyOptions) -> Result<Vec<usize>> {
    let num_rows = traversal.restriction().num_dofs();
    let counts: Vec<_> = (0..num_rows).map(|_| AtomicUsize::new(0)).collect();

    for_each_row_slot(traversal, options, |element, row_slot| {
        traversal.visit_row_slot(element, row_slot, |entry| {
            counts[entry.row.index()].fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    })?;

    Ok(counts.into_iter().map(AtomicUsize::into_inner).collect())
}

/// Exclusive prefix sum of row counts into CSR row offsets.
///
/// The last offset is the total number of nonzeros.
pub(crate) fn row_offsets_from_counts(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    offsets.push(0);
    let mut total = 0;
    for count in counts {
        total += count;
        offsets.push(total);
    }
    offsets
}

/// Run the count pass and return the CSR row offsets.
pub(crate) fn compute_row_offsets(traversal: &Traversal, options: &AssemblyOptions) -> Result<Vec<usize>> {
    let counts = count_row_entries(traversal, options)?;
    let offsets = row_offsets_from_counts(&counts);
    debug!(
        "Count pass finished: {} rows, {} nonzeros",
        counts.len(),
        offsets.last().copied().unwrap_or(0)
    );
    Ok(offsets)
}
