//! Row-distributed CSR matrices.
//!
//! Every rank owns a contiguous range of global rows. Its rows are split into a diagonal block,
//! holding the columns of the rank's own range (in local numbering), and an off-diagonal block,
//! holding all other columns in a compressed numbering given by a sorted column map.
use crate::error::{AssemblyError, Result};
use crate::parallel::comm::{all_to_all, decode, encode, CommTag, Communicator, Wait};
use crate::Real;
use bytemuck::Pod;
use itertools::izip;
use log::debug;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

/// The rank owning a global row, for a partition given by its row starts.
pub fn owner_of(row_starts: &[usize], global_row: usize) -> usize {
    row_starts.partition_point(|&start| start <= global_row) - 1
}

pub(crate) fn check_row_starts(row_starts: &[usize], size: usize) -> Result<()> {
    if row_starts.len() != size + 1 || row_starts[0] != 0 {
        return Err(AssemblyError::verification(format!(
            "row starts must begin at zero and have {} entries, got {:?}",
            size + 1,
            row_starts
        )));
    }
    if row_starts.windows(2).any(|w| w[0] > w[1]) {
        return Err(AssemblyError::verification("row starts must be non-decreasing"));
    }
    Ok(())
}

/// The communication pattern of the off-diagonal block.
///
/// Describes which off-diagonal columns this rank receives from which peer, and which of its
/// own rows it sends to which peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommPackage {
    recv_peers: Vec<usize>,
    /// Ranges into the column map, one per receive peer.
    recv_ranges: Vec<Range<usize>>,
    send_peers: Vec<usize>,
    /// Local row indices to send, one list per send peer.
    send_rows: Vec<Vec<usize>>,
}

impl CommPackage {
    /// Build the package collectively from the (sorted) off-diagonal column map of each rank.
    pub fn new<C: Communicator>(comm: &C, row_starts: &[usize], col_map_offd: &[usize]) -> Result<Self> {
        let rank = comm.rank();
        let size = comm.size();
        let first_row = row_starts[rank];

        let mut needed = vec![Vec::new(); size];
        let mut recv_peers = Vec::new();
        let mut recv_ranges: Vec<Range<usize>> = Vec::new();
        for (idx, &col) in col_map_offd.iter().enumerate() {
            let owner = owner_of(row_starts, col);
            if owner == rank {
                return Err(AssemblyError::verification(format!(
                    "off-diagonal column {} is owned by rank {} itself",
                    col, rank
                )));
            }
            needed[owner].push(col);
            match recv_peers.last() {
                Some(&last) if last == owner => {
                    if let Some(range) = recv_ranges.last_mut() {
                        range.end = idx + 1;
                    }
                }
                _ => {
                    recv_peers.push(owner);
                    recv_ranges.push(idx..idx + 1);
                }
            }
        }

        let requested: Vec<Vec<usize>> = all_to_all(comm, CommTag::COMM_PKG_SETUP, &needed)?;
        let mut send_peers = Vec::new();
        let mut send_rows = Vec::new();
        for (peer, rows) in requested.into_iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let local_rows = rows
                .into_iter()
                .map(|row| {
                    if owner_of(row_starts, row) == rank {
                        Ok(row - first_row)
                    } else {
                        Err(AssemblyError::verification(format!(
                            "rank {} requested row {} from rank {}, which does not own it",
                            peer, row, rank
                        )))
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            send_peers.push(peer);
            send_rows.push(local_rows);
        }

        debug!(
            "Rank {} communication package: receives from {} peers, sends to {} peers",
            rank,
            recv_peers.len(),
            send_peers.len()
        );

        Ok(Self {
            recv_peers,
            recv_ranges,
            send_peers,
            send_rows,
        })
    }

    pub fn recv_peers(&self) -> &[usize] {
        &self.recv_peers
    }

    pub fn send_peers(&self) -> &[usize] {
        &self.send_peers
    }

    /// The local rows sent to each send peer.
    pub fn send_rows(&self) -> &[Vec<usize>] {
        &self.send_rows
    }

    /// The number of values received per exchange, i.e. the length of the column map.
    pub fn num_recv_values(&self) -> usize {
        self.recv_ranges.last().map(|range| range.end).unwrap_or(0)
    }

    /// Send the values of the requested local rows to every peer, and post the receives for
    /// the off-diagonal columns.
    ///
    /// The received values are only available after [`PendingExchange::wait`].
    pub fn start_exchange<C: Communicator, P: Pod>(
        &self,
        comm: &C,
        tag: CommTag,
        local_values: &[P],
    ) -> Result<PendingExchange<C, P>> {
        let mut recvs = Vec::with_capacity(self.recv_peers.len());
        for (&peer, range) in self.recv_peers.iter().zip(&self.recv_ranges) {
            recvs.push((range.clone(), comm.irecv(peer, tag)?));
        }
        let mut sends = Vec::with_capacity(self.send_peers.len());
        let mut buffer = Vec::new();
        for (&peer, rows) in self.send_peers.iter().zip(&self.send_rows) {
            buffer.clear();
            for &row in rows {
                let value = local_values.get(row).ok_or_else(|| {
                    AssemblyError::verification(format!(
                        "exchange requires local row {}, but only {} values were given",
                        row,
                        local_values.len()
                    ))
                })?;
                buffer.push(*value);
            }
            sends.push(comm.isend(peer, tag, &encode(&buffer))?);
        }
        Ok(PendingExchange {
            recvs,
            sends,
            num_values: self.num_recv_values(),
            marker: PhantomData,
        })
    }
}

/// An exchange started by [`CommPackage::start_exchange`].
pub struct PendingExchange<C: Communicator, P> {
    recvs: Vec<(Range<usize>, C::RecvHandle)>,
    sends: Vec<C::SendHandle>,
    num_values: usize,
    marker: PhantomData<P>,
}

impl<C: Communicator, P: Pod> PendingExchange<C, P> {
    /// Block until all messages of the exchange have completed.
    ///
    /// Returns one value per off-diagonal column, in column map order.
    pub fn wait(self) -> Result<Vec<P>> {
        let mut values = vec![P::zeroed(); self.num_values];
        for (range, handle) in self.recvs {
            let bytes = handle
                .wait()?
                .ok_or_else(|| AssemblyError::Communication("receive completed without data".to_string()))?;
            let received: Vec<P> = decode(&bytes)?;
            if received.len() != range.len() {
                return Err(AssemblyError::Communication(format!(
                    "expected {} values, received {}",
                    range.len(),
                    received.len()
                )));
            }
            values[range].copy_from_slice(&received);
        }
        for handle in self.sends {
            handle.wait()?;
        }
        Ok(values)
    }
}

/// The rows of a square, row-distributed matrix owned by one rank.
#[derive(Debug, Clone)]
pub struct ParCsrMatrix<T> {
    rank: usize,
    row_starts: Vec<usize>,
    diag: CsrMatrix<T>,
    offd: CsrMatrix<T>,
    col_map_offd: Vec<usize>,
    comm_pkg: CommPackage,
    adopted: bool,
}

impl<T: Real> ParCsrMatrix<T> {
    /// A block-diagonal matrix whose diagonal block on this rank is `local`.
    ///
    /// If `local` is uniquely owned, its storage is moved into the distributed matrix,
    /// otherwise it is copied. Collective.
    pub fn block_diagonal<C: Communicator>(
        comm: &C,
        row_starts: Vec<usize>,
        local: Arc<CsrMatrix<T>>,
    ) -> Result<Self> {
        let rank = comm.rank();
        check_row_starts(&row_starts, comm.size())?;
        let n_local = row_starts[rank + 1] - row_starts[rank];
        if local.nrows() != n_local || local.ncols() != n_local {
            return Err(AssemblyError::verification(format!(
                "local block is {}x{}, but rank {} owns {} rows",
                local.nrows(),
                local.ncols(),
                rank,
                n_local
            )));
        }

        let (diag, adopted) = match Arc::try_unwrap(local) {
            Ok(matrix) => (matrix, true),
            Err(shared) => (CsrMatrix::clone(&shared), false),
        };
        if adopted {
            debug!("Rank {} adopted the storage of its local block", rank);
        } else {
            debug!("Rank {} copied its local block, which is shared elsewhere", rank);
        }

        let comm_pkg = CommPackage::new(comm, &row_starts, &[])?;
        Ok(Self {
            rank,
            row_starts,
            diag,
            offd: CsrMatrix::zeros(n_local, 0),
            col_map_offd: Vec::new(),
            comm_pkg,
            adopted,
        })
    }

    /// Split the owned rows, given with global column indices, into diagonal and off-diagonal
    /// blocks. Collective.
    pub fn from_local_rows<C: Communicator>(comm: &C, row_starts: Vec<usize>, rows: &CsrMatrix<T>) -> Result<Self> {
        let rank = comm.rank();
        check_row_starts(&row_starts, comm.size())?;
        let owned = row_starts[rank]..row_starts[rank + 1];
        let global_size = row_starts[comm.size()];
        if rows.nrows() != owned.len() || rows.ncols() != global_size {
            return Err(AssemblyError::verification(format!(
                "rank {} owns {} of {} rows, but was given a {}x{} row block",
                rank,
                owned.len(),
                global_size,
                rows.nrows(),
                rows.ncols()
            )));
        }

        let mut col_map_offd: Vec<usize> = rows
            .col_indices()
            .iter()
            .copied()
            .filter(|col| !owned.contains(col))
            .collect();
        col_map_offd.sort_unstable();
        col_map_offd.dedup();

        let mut diag_offsets = vec![0];
        let mut diag_cols = Vec::new();
        let mut diag_values = Vec::new();
        let mut offd_offsets = vec![0];
        let mut offd_cols = Vec::new();
        let mut offd_values = Vec::new();
        for row in rows.row_iter() {
            for (&col, &value) in izip!(row.col_indices(), row.values()) {
                if owned.contains(&col) {
                    diag_cols.push(col - owned.start);
                    diag_values.push(value);
                } else {
                    let compressed = col_map_offd
                        .binary_search(&col)
                        .map_err(|_| AssemblyError::verification("column missing from column map"))?;
                    offd_cols.push(compressed);
                    offd_values.push(value);
                }
            }
            diag_offsets.push(diag_cols.len());
            offd_offsets.push(offd_cols.len());
        }

        let n_local = owned.len();
        let diag = CsrMatrix::try_from_unsorted_csr_data(n_local, n_local, diag_offsets, diag_cols, diag_values)?;
        let offd =
            CsrMatrix::try_from_unsorted_csr_data(n_local, col_map_offd.len(), offd_offsets, offd_cols, offd_values)?;
        let comm_pkg = CommPackage::new(comm, &row_starts, &col_map_offd)?;

        Ok(Self {
            rank,
            row_starts,
            diag,
            offd,
            col_map_offd,
            comm_pkg,
            adopted: false,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn row_starts(&self) -> &[usize] {
        &self.row_starts
    }

    pub fn first_row(&self) -> usize {
        self.row_starts[self.rank]
    }

    pub fn num_local_rows(&self) -> usize {
        self.row_starts[self.rank + 1] - self.row_starts[self.rank]
    }

    pub fn global_size(&self) -> usize {
        self.row_starts.last().copied().unwrap_or(0)
    }

    pub fn diag(&self) -> &CsrMatrix<T> {
        &self.diag
    }

    pub fn offd(&self) -> &CsrMatrix<T> {
        &self.offd
    }

    pub(crate) fn blocks_mut(&mut self) -> (&mut CsrMatrix<T>, &mut CsrMatrix<T>) {
        (&mut self.diag, &mut self.offd)
    }

    /// Global column index of each off-diagonal column.
    pub fn col_map_offd(&self) -> &[usize] {
        &self.col_map_offd
    }

    pub fn comm_pkg(&self) -> &CommPackage {
        &self.comm_pkg
    }

    /// Whether the diagonal block took over the storage of the local block it was built from.
    pub fn adopted_local_storage(&self) -> bool {
        self.adopted
    }

    /// The owned rows with global column indices, sorted within each row.
    pub fn to_local_rows(&self) -> CsrMatrix<T> {
        let first = self.first_row();
        let mut coo = CooMatrix::new(self.num_local_rows(), self.global_size());
        for (i, j, &v) in self.diag.triplet_iter() {
            coo.push(i, first + j, v);
        }
        for (i, j, &v) in self.offd.triplet_iter() {
            coo.push(i, self.col_map_offd[j], v);
        }
        CsrMatrix::from(&coo)
    }
}

impl<T: Real + Pod> ParCsrMatrix<T> {
    /// The Galerkin product `Pᵗ A P`, summed over all ranks. Collective.
    ///
    /// `local` is this rank's block in local numbering, and `prolongation` maps local DOFs to
    /// the global numbering partitioned by `row_starts`.
    pub fn galerkin<C: Communicator>(
        comm: &C,
        row_starts: Vec<usize>,
        local: &CsrMatrix<T>,
        prolongation: &CsrMatrix<T>,
    ) -> Result<Self> {
        let rank = comm.rank();
        let size = comm.size();
        check_row_starts(&row_starts, size)?;
        let global_size = row_starts[size];
        if prolongation.nrows() != local.nrows()
            || prolongation.ncols() != global_size
            || local.nrows() != local.ncols()
        {
            return Err(AssemblyError::verification(format!(
                "prolongation is {}x{}, expected {}x{} for a {}x{} local block",
                prolongation.nrows(),
                prolongation.ncols(),
                local.nrows(),
                global_size,
                local.nrows(),
                local.ncols()
            )));
        }

        let ap = local * prolongation;
        let ptap = &prolongation.transpose() * &ap;

        let mut outgoing_indices = vec![Vec::new(); size];
        let mut outgoing_values = vec![Vec::new(); size];
        for (row_index, row) in ptap.row_iter().enumerate() {
            if row.nnz() == 0 {
                continue;
            }
            let owner = owner_of(&row_starts, row_index);
            for (&col, &value) in izip!(row.col_indices(), row.values()) {
                outgoing_indices[owner].push(row_index);
                outgoing_indices[owner].push(col);
                outgoing_values[owner].push(value);
            }
        }

        let mut incoming_indices = all_to_all(comm, CommTag::GALERKIN, &outgoing_indices)?;
        let mut incoming_values = all_to_all(comm, CommTag::GALERKIN, &outgoing_values)?;
        incoming_indices[rank] = std::mem::take(&mut outgoing_indices[rank]);
        incoming_values[rank] = std::mem::take(&mut outgoing_values[rank]);

        let first = row_starts[rank];
        let mut coo = CooMatrix::new(row_starts[rank + 1] - first, global_size);
        for (indices, values) in incoming_indices.iter().zip(&incoming_values) {
            if indices.len() != 2 * values.len() {
                return Err(AssemblyError::Communication(
                    "Galerkin contributions have mismatched index and value counts".to_string(),
                ));
            }
            for (pair, &value) in indices.chunks_exact(2).zip(values) {
                let (row, col) = (pair[0], pair[1]);
                if owner_of(&row_starts, row) != rank {
                    return Err(AssemblyError::verification(format!(
                        "rank {} received a contribution to row {}, which it does not own",
                        rank, row
                    )));
                }
                coo.push(row - first, col, value);
            }
        }

        debug!("Rank {} summed Galerkin contributions: {} triplets", rank, coo.nnz());
        Self::from_local_rows(comm, row_starts, &CsrMatrix::from(&coo))
    }

    /// Distributed matrix-vector product `y = A x`. Collective.
    ///
    /// `x` holds the values of the owned rows; the result holds the owned rows of `y`.
    pub fn mul<C: Communicator>(&self, comm: &C, x: &[T]) -> Result<Vec<T>> {
        if x.len() != self.num_local_rows() {
            return Err(AssemblyError::verification(format!(
                "vector has {} entries, but rank {} owns {} rows",
                x.len(),
                self.rank,
                self.num_local_rows()
            )));
        }
        let exchange = self.comm_pkg.start_exchange(comm, CommTag::MATVEC, x)?;

        let mut y = vec![T::zero(); self.num_local_rows()];
        for (y_i, row) in izip!(&mut y, self.diag.row_iter()) {
            for (&col, &value) in izip!(row.col_indices(), row.values()) {
                *y_i += value * x[col];
            }
        }

        let x_offd = exchange.wait()?;
        for (y_i, row) in izip!(&mut y, self.offd.row_iter()) {
            for (&col, &value) in izip!(row.col_indices(), row.values()) {
                *y_i += value * x_offd[col];
            }
        }
        Ok(y)
    }
}
