//! Batched CSR assembly.
//!
//! Assembly runs in two passes over the same `(element, row slot)` index space. The count pass
//! determines the number of distinct entries of every global row, and after an exclusive prefix
//! sum over the counts, the fill pass writes each distinct `(row, col)` entry exactly once.
//!
//! Pairs of DOFs shared by several elements are written by a single owner: the smallest element
//! referencing both DOFs. The owner sums the contributions of all sharing elements in a fixed
//! order, so the assembled values do not depend on thread scheduling.
use crate::error::{AssemblyError, Result};
use crate::form::{DiscretizationKind, FormDescriptor};
use crate::incidence::{ElementRestriction, IncidenceProvider};
use crate::kernel::{ElementValues, LocalKernel, LocalMatrices, VertexGeometryProvider};
use crate::options::AssemblyOptions;
use crate::sparsity::LocalSparsity;
use crate::Real;
use log::{debug, info};
use nalgebra_sparse::CsrMatrix;

mod count;
mod eliminate;
mod fill;
mod traversal;

pub use eliminate::eliminate_essential_dofs_keep_diagonal;

use count::compute_row_offsets;
use fill::fill_entries;
use traversal::Traversal;

/// Assembles the global matrix of a low-order-refined discretization.
///
/// The incidence relation, the vertex geometry and the kernel output are gathered once on
/// construction. Every call to one of the assembly methods then only runs the count and fill
/// passes (and elimination).
#[derive(Debug, Clone)]
pub struct BatchedAssembler<T> {
    kind: DiscretizationKind,
    restriction: ElementRestriction,
    sparsity: LocalSparsity,
    values: ElementValues<T>,
    options: AssemblyOptions,
}

impl<T: Real> BatchedAssembler<T> {
    pub fn new(
        form: &FormDescriptor,
        incidence: &dyn IncidenceProvider,
        kernel: &dyn LocalKernel<T>,
        geometry: &dyn VertexGeometryProvider<T>,
    ) -> Result<Self> {
        Self::with_options(form, incidence, kernel, geometry, AssemblyOptions::default())
    }

    pub fn with_options(
        form: &FormDescriptor,
        incidence: &dyn IncidenceProvider,
        kernel: &dyn LocalKernel<T>,
        geometry: &dyn VertexGeometryProvider<T>,
        options: AssemblyOptions,
    ) -> Result<Self> {
        let kind = form.check_supported()?;
        if kernel.kind() != kind {
            return Err(AssemblyError::KindMismatch {
                expected: kind,
                found: kernel.kind(),
            });
        }

        let restriction = incidence.element_restriction()?;
        restriction.check_degree(options.max_incidence_degree)?;

        let vertices = geometry.lor_vertex_coordinates()?;
        let LocalMatrices { sparsity, values } = kernel.assemble(&vertices)?;
        Self::from_parts(kind, restriction, sparsity, values, options)
    }

    /// Construct an assembler directly from collaborator outputs.
    pub fn from_parts(
        kind: DiscretizationKind,
        restriction: ElementRestriction,
        sparsity: LocalSparsity,
        values: ElementValues<T>,
        options: AssemblyOptions,
    ) -> Result<Self> {
        restriction.check_degree(options.max_incidence_degree)?;
        if sparsity.dofs_per_element() != restriction.dofs_per_element()
            || values.dofs_per_element() != restriction.dofs_per_element()
        {
            return Err(AssemblyError::verification(format!(
                "DOFs per element disagree: restriction {}, sparsity template {}, values {}",
                restriction.dofs_per_element(),
                sparsity.dofs_per_element(),
                values.dofs_per_element()
            )));
        }
        if values.nnz_per_row() != sparsity.nnz_per_row() {
            return Err(AssemblyError::verification(format!(
                "values have {} candidates per row, but the sparsity template has {}",
                values.nnz_per_row(),
                sparsity.nnz_per_row()
            )));
        }
        if values.num_elements() != restriction.num_elements() {
            return Err(AssemblyError::verification(format!(
                "values are given for {} elements, but the restriction has {}",
                values.num_elements(),
                restriction.num_elements()
            )));
        }

        debug!(
            "Prepared batched {:?} assembler: {} DOFs, {} elements, {} candidates per row",
            kind,
            restriction.num_dofs(),
            restriction.num_elements(),
            sparsity.nnz_per_row()
        );

        Ok(Self {
            kind,
            restriction,
            sparsity,
            values,
            options,
        })
    }

    pub fn kind(&self) -> DiscretizationKind {
        self.kind
    }

    pub fn restriction(&self) -> &ElementRestriction {
        &self.restriction
    }

    pub fn sparsity(&self) -> &LocalSparsity {
        &self.sparsity
    }

    pub fn values(&self) -> &ElementValues<T> {
        &self.values
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    pub fn num_dofs(&self) -> usize {
        self.restriction.num_dofs()
    }

    /// Run the count and fill passes, without eliminating any DOFs.
    pub fn assemble_without_bc(&self) -> Result<CsrMatrix<T>> {
        let n = self.num_dofs();
        let traversal = Traversal::new(&self.restriction, &self.sparsity)?;
        let row_offsets = compute_row_offsets(&traversal, &self.options)?;
        let (col_indices, values) = fill_entries(&traversal, &self.values, &row_offsets, &self.options)?;
        let matrix = CsrMatrix::try_from_unsorted_csr_data(n, n, row_offsets, col_indices, values)?;

        info!(
            "Assembled {:?} matrix: {} DOFs, {} elements, {} nonzeros",
            self.kind,
            n,
            self.restriction.num_elements(),
            matrix.nnz()
        );
        Ok(matrix)
    }

    /// Assemble the matrix and eliminate the given essential DOFs, keeping their diagonal.
    pub fn assemble(&self, essential_dofs: &[usize]) -> Result<CsrMatrix<T>> {
        let mut matrix = self.assemble_without_bc()?;
        if !essential_dofs.is_empty() {
            eliminate_essential_dofs_keep_diagonal(&mut matrix, essential_dofs)?;
        }
        Ok(matrix)
    }
}
