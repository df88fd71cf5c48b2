//! Distributed assembly.
//!
//! Each rank assembles the block of its own elements with the serial passes. The blocks are
//! then combined into a row-distributed [`ParCsrMatrix`], either directly as a block-diagonal
//! matrix when the local numbering is a restriction of the global one, or through the Galerkin
//! product `Pᵗ A P` with a prolongation supplied by the caller.
use crate::assembly::BatchedAssembler;
use crate::error::Result;
use crate::Real;
use bytemuck::Pod;
use log::{debug, info};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::sync::Arc;

pub mod comm;
mod eliminate;
pub mod matrix;

pub use comm::{ChannelComm, CommTag, Communicator, SerialComm, Wait};
pub use matrix::{CommPackage, ParCsrMatrix, PendingExchange};

use comm::all_to_all;
use matrix::check_row_starts;

/// How the local DOFs of a rank relate to the global, row-distributed numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelLayout<T> {
    /// `row_starts[r]..row_starts[r + 1]` are the global rows owned by rank `r`.
    pub row_starts: Vec<usize>,
    /// Maps local DOFs to global DOFs. `None` means local DOF `i` is global DOF
    /// `row_starts[rank] + i`.
    pub prolongation: Option<CsrMatrix<T>>,
}

impl<T> ParallelLayout<T> {
    pub fn from_row_starts(row_starts: Vec<usize>) -> Self {
        Self {
            row_starts,
            prolongation: None,
        }
    }

    pub fn with_prolongation(self, prolongation: CsrMatrix<T>) -> Self {
        Self {
            prolongation: Some(prolongation),
            ..self
        }
    }
}

/// Whether `p` selects exactly the owned global DOFs, in order, with unit weights.
///
/// Returns `false` if `rank` has no range in `row_starts`.
pub fn is_identity_prolongation<T: Real>(p: &CsrMatrix<T>, row_starts: &[usize], rank: usize) -> bool {
    if rank + 1 >= row_starts.len() || row_starts[rank] > row_starts[rank + 1] {
        return false;
    }
    let first = row_starts[rank];
    let n_local = row_starts[rank + 1] - first;
    p.nrows() == n_local
        && p.ncols() == row_starts.last().copied().unwrap_or(0)
        && p.row_iter().enumerate().all(|(i, row)| {
            row.col_indices() == [first + i] && row.values().iter().all(|value| *value == T::one())
        })
}

/// The prolongation implied by an absent one: local DOF `i` is global DOF `row_starts[rank] + i`.
fn owned_identity_prolongation<T: Real>(row_starts: &[usize], rank: usize) -> CsrMatrix<T> {
    let first = row_starts[rank];
    let n_local = row_starts[rank + 1] - first;
    let mut coo = CooMatrix::new(n_local, row_starts.last().copied().unwrap_or(0));
    for i in 0..n_local {
        coo.push(i, first + i, T::one());
    }
    CsrMatrix::from(&coo)
}

impl<T: Real + Pod> ParCsrMatrix<T> {
    /// Combine the local blocks of all ranks into a distributed matrix. Collective.
    ///
    /// If every rank's prolongation is absent or the identity, the result is block diagonal and
    /// takes over the storage of `local` when it is uniquely owned. Otherwise, it is the sum of
    /// the Galerkin products of all ranks.
    pub fn from_local_block<C: Communicator>(
        comm: &C,
        layout: &ParallelLayout<T>,
        local: Arc<CsrMatrix<T>>,
    ) -> Result<Self> {
        let rank = comm.rank();
        check_row_starts(&layout.row_starts, comm.size())?;
        let identity = match &layout.prolongation {
            None => true,
            Some(p) => is_identity_prolongation(p, &layout.row_starts, rank),
        };

        // Both constructions are collective, so all ranks must take the same one
        let flags = vec![vec![u8::from(identity)]; comm.size()];
        let all_identity = all_to_all(comm, CommTag::COMM_PKG_SETUP, &flags)?
            .iter()
            .enumerate()
            .filter(|(peer, _)| *peer != rank)
            .all(|(_, flag)| flag.first() == Some(&1))
            && identity;

        if all_identity {
            return Self::block_diagonal(comm, layout.row_starts.clone(), local);
        }

        debug!("Rank {} forms the distributed matrix as a Galerkin product", rank);
        match &layout.prolongation {
            Some(p) => Self::galerkin(comm, layout.row_starts.clone(), &local, p),
            None => {
                let p = owned_identity_prolongation(&layout.row_starts, rank);
                Self::galerkin(comm, layout.row_starts.clone(), &local, &p)
            }
        }
    }
}

impl<T: Real + Pod> BatchedAssembler<T> {
    /// Assemble the distributed matrix and eliminate essential DOFs across ranks. Collective.
    ///
    /// `essential_dofs` are owned rows of the distributed matrix, relative to the first row of
    /// this rank. Unlike [`assemble`](BatchedAssembler::assemble), the diagonal entries of
    /// eliminated DOFs are set to one.
    pub fn par_assemble<C: Communicator>(
        &self,
        comm: &C,
        layout: &ParallelLayout<T>,
        essential_dofs: &[usize],
    ) -> Result<ParCsrMatrix<T>> {
        let local = Arc::new(self.assemble_without_bc()?);
        let mut matrix = ParCsrMatrix::from_local_block(comm, layout, local)?;
        matrix.eliminate_essential_dofs(comm, essential_dofs, self.options().column_elimination)?;

        info!(
            "Rank {} of {} assembled distributed matrix: {} of {} rows, {} diagonal and {} off-diagonal nonzeros",
            comm.rank(),
            comm.size(),
            matrix.num_local_rows(),
            matrix.global_size(),
            matrix.diag().nnz(),
            matrix.offd().nnz()
        );
        Ok(matrix)
    }
}
