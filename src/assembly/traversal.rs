//! The enumeration shared by the count and fill passes.
//!
//! Both passes visit every `(element, row slot)` pair and every present candidate of the
//! template row, and classify the resulting global `(row, col)` pair with the same rule. The
//! write budget reserved by the count pass is only correct if this classification is identical
//! in both passes, which is why it lives in a single place.
use crate::error::{AssemblyError, Result};
use crate::incidence::ElementRestriction;
use crate::kernel::ElementValues;
use crate::options::{AssemblyOptions, Execution};
use crate::signed::SignedIndex;
use crate::sparsity::LocalSparsity;
use crate::Real;
use rayon::prelude::*;

/// How a visited `(row, col)` pair must be treated by the visiting element.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Ownership {
    /// One of the two DOFs is referenced by a single element slot, so no other element can
    /// assert the pair. The element's own contribution is the entry.
    Direct,
    /// The visiting element is the smallest element referencing both DOFs. It writes the sum
    /// of the contributions of every element sharing the pair.
    Owner,
}

/// A global `(row, col)` pair that the visiting element is responsible for writing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct VisitedEntry {
    pub row: SignedIndex,
    pub col: SignedIndex,
    /// The candidate index within the template row of the visiting element.
    pub k: usize,
    pub ownership: Ownership,
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct Traversal<'a> {
    restriction: &'a ElementRestriction,
    sparsity: &'a LocalSparsity,
}

impl<'a> Traversal<'a> {
    pub fn new(restriction: &'a ElementRestriction, sparsity: &'a LocalSparsity) -> Result<Self> {
        if restriction.dofs_per_element() != sparsity.dofs_per_element() {
            return Err(AssemblyError::verification(format!(
                "restriction has {} DOFs per element, but the sparsity template has {}",
                restriction.dofs_per_element(),
                sparsity.dofs_per_element()
            )));
        }
        Ok(Self { restriction, sparsity })
    }

    pub fn restriction(&self) -> &'a ElementRestriction {
        self.restriction
    }

    /// The number of `(element, row slot)` pairs.
    pub fn num_row_slots(&self) -> usize {
        self.restriction.num_elements() * self.restriction.dofs_per_element()
    }

    /// Visit every entry of the given `(element, row slot)` pair that this element must write.
    ///
    /// Pairs shared with other elements for which this element is not the elected owner are
    /// skipped.
    #[inline]
    pub fn visit_row_slot<F>(&self, element: usize, row_slot: usize, mut f: F) -> Result<()>
    where
        F: FnMut(VisitedEntry) -> Result<()>,
    {
        let row = self.restriction.element_dof(element, row_slot);
        let row_degree = self.restriction.degree(row.index());
        for (k, col_slot) in self.sparsity.row_columns(row_slot) {
            let col = self.restriction.element_dof(element, col_slot);
            let col_degree = self.restriction.degree(col.index());
            let ownership = if row_degree == 1 || col_degree == 1 {
                Ownership::Direct
            } else if self.min_common_element(row.index(), col.index()) == Some(element) {
                Ownership::Owner
            } else {
                continue;
            };
            f(VisitedEntry {
                row,
                col,
                k,
                ownership,
            })?;
        }
        Ok(())
    }

    /// The smallest element referencing both DOFs.
    ///
    /// Incidence lists are sorted by element, so the first match of a merge is the minimum.
    pub fn min_common_element(&self, dof_a: usize, dof_b: usize) -> Option<usize> {
        let mut a = self.restriction.incidence(dof_a).peekable();
        let mut b = self.restriction.incidence(dof_b).peekable();
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            if x.element == y.element {
                return Some(x.element);
            } else if x.element < y.element {
                a.next();
            } else {
                b.next();
            }
        }
        None
    }

    /// The value of a visited entry.
    ///
    /// Direct entries take the visiting element's value, signed by the relative orientation of
    /// the row and column DOFs. Owned entries sum, over every element referencing both DOFs,
    /// the values of all `(row slot, col slot)` combinations of that element.
    pub fn entry_value<T: Real>(
        &self,
        entry: &VisitedEntry,
        element: usize,
        row_slot: usize,
        values: &ElementValues<T>,
    ) -> Result<T> {
        match entry.ownership {
            Ownership::Direct => {
                let sign: T = entry.row.relative_sign(&entry.col);
                Ok(sign * *values.get(entry.k, row_slot, element))
            }
            Ownership::Owner => {
                let mut sum = T::zero();
                for i in self.restriction.incidence(entry.row.index()) {
                    for j in self.restriction.incidence(entry.col.index()) {
                        if i.element != j.element {
                            continue;
                        }
                        let (i_slot, j_slot) = (i.slot.index(), j.slot.index());
                        let k = self
                            .sparsity
                            .find_slot(i_slot, j_slot)
                            .ok_or(AssemblyError::MissingTemplateEntry {
                                row_slot: i_slot,
                                col_slot: j_slot,
                            })?;
                        let sign: T = i.slot.relative_sign(&j.slot);
                        sum += sign * *values.get(k, i_slot, i.element);
                    }
                }
                Ok(sum)
            }
        }
    }
}

/// Run `f` on every `(element, row slot)` pair, in parallel or serially.
///
/// The first error aborts the traversal.
pub(crate) fn for_each_row_slot<F>(traversal: &Traversal, options: &AssemblyOptions, f: F) -> Result<()>
where
    F: Fn(usize, usize) -> Result<()> + Sync + Send,
{
    let n = traversal.restriction().dofs_per_element();
    let num_row_slots = traversal.num_row_slots();
    match options.execution {
        Execution::Parallel => (0..num_row_slots)
            .into_par_iter()
            .with_min_len(options.min_parallel_len.max(1))
            .try_for_each(|index| f(index / n, index % n)),
        Execution::Serial => (0..num_row_slots).try_for_each(|index| f(index / n, index % n)),
    }
}
