use fenris_lor::assembly::BatchedAssembler;
use fenris_lor::error::AssemblyError;
use fenris_lor::form::{DiscretizationKind, FormDescriptor, IntegratorKind};
use fenris_lor::kernel::H1LorKernel;
use fenris_lor::nalgebra::{DMatrix, DVector};
use fenris_lor::nalgebra_sparse::{CooMatrix, CsrMatrix};
use fenris_lor::options::{AssemblyOptions, ColumnElimination};
use fenris_lor::parallel::comm::{ChannelComm, CommTag, Communicator, SerialComm, Wait};
use fenris_lor::parallel::{is_identity_prolongation, ParCsrMatrix, ParallelLayout};
use fenris_lor::procedural::{partition_unit_interval_h1, unit_interval_h1, IntervalPartition};
use std::sync::Arc;
use matrixcompare::assert_matrix_eq;
use util::assert_csr_invariants;

fn h1_form() -> FormDescriptor {
    FormDescriptor::new(DiscretizationKind::H1)
        .with_integrator(IntegratorKind::Diffusion)
        .with_integrator(IntegratorKind::Mass)
}

/// Run one closure per rank, each on its own thread, and collect the results by rank.
fn run_ranks<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(ChannelComm) -> R + Sync,
    R: Send,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = ChannelComm::world(size)
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("Rank panicked"))
            .collect()
    })
}

/// The essential DOFs of a partition, as owned rows relative to the first row of the rank.
fn owned_essential_rows(part: &IntervalPartition<f64>, rank: usize) -> Vec<usize> {
    let row_starts = &part.layout.row_starts;
    let owned = row_starts[rank]..row_starts[rank + 1];
    part.space
        .boundary_dofs
        .iter()
        .map(|&local| part.local_to_global[local])
        .filter(|global| owned.contains(global))
        .map(|global| global - owned.start)
        .collect()
}

/// Stack the owned rows of all ranks into a dense global matrix.
fn stack_rows(parts: &[CsrMatrix<f64>]) -> DMatrix<f64> {
    let ncols = parts[0].ncols();
    let nrows = parts.iter().map(CsrMatrix::nrows).sum();
    let mut global = DMatrix::zeros(nrows, ncols);
    let mut offset = 0;
    for part in parts {
        let dense = DMatrix::from(part);
        global.rows_mut(offset, part.nrows()).copy_from(&dense);
        offset += part.nrows();
    }
    global
}

/// The serial reference: assemble, eliminate keeping the diagonal, then force a unit diagonal.
fn serial_reference(cells: usize, order: usize, kernel: &H1LorKernel<f64>) -> DMatrix<f64> {
    let space = unit_interval_h1::<f64>(cells, order);
    let assembler = BatchedAssembler::new(&h1_form(), &space.restriction, kernel, &space.vertices).unwrap();
    let mut dense = DMatrix::from(&assembler.assemble(&space.boundary_dofs).unwrap());
    for &dof in &space.boundary_dofs {
        dense[(dof, dof)] = 1.0;
    }
    dense
}

#[test]
fn serial_comm_block_diagonal_adopts_local_storage() {
    let space = unit_interval_h1::<f64>(4, 2);
    let kernel = H1LorKernel::new(1, 2).with_mass(1.0);
    let assembler = BatchedAssembler::new(&h1_form(), &space.restriction, &kernel, &space.vertices).unwrap();
    let n = space.restriction.num_dofs();

    let layout = ParallelLayout::from_row_starts(vec![0, n]);
    let matrix = assembler.par_assemble(&SerialComm, &layout, &space.boundary_dofs).unwrap();

    assert!(matrix.adopted_local_storage());
    assert_eq!(matrix.offd().ncols(), 0);
    assert!(matrix.col_map_offd().is_empty());
    assert_csr_invariants(matrix.diag());
    assert_matrix_eq!(DMatrix::from(matrix.diag()), serial_reference(4, 2, &kernel));
}

#[test]
fn shared_local_block_is_copied() {
    let space = unit_interval_h1::<f64>(2, 1);
    let kernel = H1LorKernel::new(1, 1);
    let assembler = BatchedAssembler::new(&h1_form(), &space.restriction, &kernel, &space.vertices).unwrap();
    let local = Arc::new(assembler.assemble_without_bc().unwrap());
    let layout = ParallelLayout::from_row_starts(vec![0, 3]);

    let copied = ParCsrMatrix::from_local_block(&SerialComm, &layout, Arc::clone(&local)).unwrap();
    assert!(!copied.adopted_local_storage());
    assert_eq!(copied.diag(), local.as_ref());

    // The identity prolongation is recognized, so the block is still adopted
    let identity = CsrMatrix::identity(3);
    assert!(is_identity_prolongation(&identity, &[0, 3], 0));
    let layout = layout.with_prolongation(identity);
    let expected = local.as_ref().clone();
    let adopted = ParCsrMatrix::from_local_block(&SerialComm, &layout, local).unwrap();
    assert!(adopted.adopted_local_storage());
    assert_eq!(adopted.diag(), &expected);
}

#[test]
fn identity_prolongation_requires_a_valid_rank() {
    let identity = CsrMatrix::<f64>::identity(3);
    assert!(is_identity_prolongation(&identity, &[0, 3], 0));
    assert!(!is_identity_prolongation(&identity, &[0, 3], 1));
    assert!(!is_identity_prolongation(&identity, &[], 0));
    assert!(!is_identity_prolongation(&identity, &[3, 0], 0));
}

#[test]
fn serial_comm_galerkin_product_with_permutation() {
    let dense = DMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, -2.0, 0.0, -2.0, 4.0]);
    let local = CsrMatrix::from(&dense);
    // Local DOF i is global DOF 2 - i
    let mut coo = CooMatrix::new(3, 3);
    for i in 0..3 {
        coo.push(i, 2 - i, 1.0);
    }
    let p = CsrMatrix::from(&coo);
    assert!(!is_identity_prolongation(&p, &[0, 3], 0));

    let layout = ParallelLayout::from_row_starts(vec![0, 3]).with_prolongation(p.clone());
    let matrix = ParCsrMatrix::from_local_block(&SerialComm, &layout, Arc::new(local)).unwrap();
    assert!(!matrix.adopted_local_storage());

    let p_dense = DMatrix::from(&p);
    let expected = p_dense.transpose() * &dense * &p_dense;
    assert_matrix_eq!(DMatrix::from(&matrix.to_local_rows()), expected, comp = abs, tol = 1e-14);
}

/// Assemble two linear segments on [0, 1] on two ranks, with global DOF 1 essential.
///
/// Rank 0 owns global DOF 0 and rank 1 owns DOFs 1 and 2, so DOF 1 is an off-diagonal column on
/// rank 0. If `implicit_identity` is set, rank 1 passes no prolongation at all.
fn assemble_two_segments(strategy: ColumnElimination, implicit_identity: bool) -> Vec<ParCsrMatrix<f64>> {
    let kernel = H1LorKernel::new(1, 1);
    run_ranks(2, |comm| {
        let rank = comm.rank();
        let parts = partition_unit_interval_h1::<f64>(2, 1, 2);
        let part = &parts[rank];
        let options = AssemblyOptions::default().with_column_elimination(strategy);
        let assembler =
            BatchedAssembler::with_options(&h1_form(), &part.space.restriction, &kernel, &part.space.vertices, options)
                .unwrap();
        let layout = if implicit_identity && rank == 1 {
            ParallelLayout::from_row_starts(part.layout.row_starts.clone())
        } else {
            part.layout.clone()
        };
        let essential = if rank == 1 { vec![0] } else { vec![] };
        assembler.par_assemble(&comm, &layout, &essential).unwrap()
    })
}

fn assert_two_segments_eliminated(matrices: &[ParCsrMatrix<f64>]) {
    assert_eq!(matrices[0].col_map_offd(), &[1]);
    assert_eq!(matrices[1].col_map_offd(), &[0]);
    assert_eq!(matrices[0].comm_pkg().recv_peers(), &[1]);
    assert_eq!(matrices[0].comm_pkg().send_peers(), &[1]);

    let rows: Vec<_> = matrices.iter().map(ParCsrMatrix::to_local_rows).collect();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        2.0, 0.0, 0.0,
        0.0, 1.0, 0.0,
        0.0, 0.0, 2.0,
    ]);
    assert_matrix_eq!(stack_rows(&rows), expected, comp = abs, tol = 1e-12);
}

#[test]
fn two_ranks_eliminate_shared_dof_across_boundary() {
    for strategy in [ColumnElimination::Scan, ColumnElimination::BinarySearch] {
        let matrices = assemble_two_segments(strategy, false);
        assert_two_segments_eliminated(&matrices);
        // The essential DOF is stored as an explicit zero in the off-diagonal block of rank 0
        assert_eq!(matrices[0].offd().nnz(), 1);
        assert_eq!(matrices[0].offd().values(), &[0.0]);
    }
}

#[test]
fn absent_prolongation_joins_galerkin_product_of_other_ranks() {
    let parts = partition_unit_interval_h1::<f64>(2, 1, 2);
    let p1 = parts[1].layout.prolongation.as_ref().unwrap();
    assert!(is_identity_prolongation(p1, &parts[1].layout.row_starts, 1));

    for strategy in [ColumnElimination::Scan, ColumnElimination::BinarySearch] {
        let matrices = assemble_two_segments(strategy, true);
        assert!(matrices.iter().all(|matrix| !matrix.adopted_local_storage()));
        assert_two_segments_eliminated(&matrices);
    }
}

#[test]
fn distributed_assembly_matches_serial_assembly() {
    let (cells, order) = (7, 3);
    let kernel = H1LorKernel::new(1, order).with_mass(0.5);
    let expected = serial_reference(cells, order, &kernel);

    for strategy in [ColumnElimination::Scan, ColumnElimination::BinarySearch] {
        for ranks in [1, 2, 3] {
            let rows = run_ranks(ranks, |comm| {
                let rank = comm.rank();
                let parts = partition_unit_interval_h1::<f64>(cells, order, ranks);
                let part = &parts[rank];
                let options = AssemblyOptions::default().with_column_elimination(strategy);
                let assembler = BatchedAssembler::with_options(
                    &h1_form(),
                    &part.space.restriction,
                    &kernel,
                    &part.space.vertices,
                    options,
                )
                .unwrap();
                let matrix = assembler
                    .par_assemble(&comm, &part.layout, &owned_essential_rows(part, rank))
                    .unwrap();
                assert_csr_invariants(matrix.diag());
                assert_csr_invariants(matrix.offd());
                matrix.to_local_rows()
            });
            assert_matrix_eq!(stack_rows(&rows), expected, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn distributed_matvec_matches_dense_product() {
    let (cells, order, ranks) = (6, 2, 3);
    let kernel = H1LorKernel::new(1, order).with_mass(1.0);
    let expected_matrix = serial_reference(cells, order, &kernel);
    let n = expected_matrix.nrows();
    let x = DVector::from_fn(n, |i, _| (i as f64 * 0.7).sin());
    let expected = &expected_matrix * &x;

    let results = run_ranks(ranks, |comm| {
        let rank = comm.rank();
        let parts = partition_unit_interval_h1::<f64>(cells, order, ranks);
        let part = &parts[rank];
        let assembler =
            BatchedAssembler::new(&h1_form(), &part.space.restriction, &kernel, &part.space.vertices).unwrap();
        let matrix = assembler
            .par_assemble(&comm, &part.layout, &owned_essential_rows(part, rank))
            .unwrap();
        let owned = matrix.first_row()..matrix.first_row() + matrix.num_local_rows();
        let x_local: Vec<f64> = owned.map(|i| x[i]).collect();
        matrix.mul(&comm, &x_local).unwrap()
    });

    let y = DVector::from_vec(results.into_iter().flatten().collect());
    assert_matrix_eq!(y, expected, comp = abs, tol = 1e-12);
}

#[test]
fn mismatched_local_block_is_rejected() {
    let local = Arc::new(CsrMatrix::<f64>::identity(2));
    let layout = ParallelLayout::from_row_starts(vec![0, 3]);
    let result = ParCsrMatrix::from_local_block(&SerialComm, &layout, local);
    assert!(matches!(result, Err(AssemblyError::Verification(_))));

    let local = Arc::new(CsrMatrix::<f64>::identity(2));
    let layout = ParallelLayout::from_row_starts(vec![0, 1, 2]);
    let result = ParCsrMatrix::from_local_block(&SerialComm, &layout, local);
    assert!(matches!(result, Err(AssemblyError::Verification(_))));
}

#[test]
fn serial_comm_has_no_peers() {
    assert_eq!(SerialComm.size(), 1);
    assert!(matches!(
        SerialComm.isend(1, CommTag::MATVEC, &[]),
        Err(AssemblyError::Communication(_))
    ));
}

#[test]
fn lost_peer_is_a_communication_error() {
    let mut world = ChannelComm::world(2);
    let comm1 = world.pop().unwrap();
    drop(comm1);
    let recv = world[0].irecv(1, CommTag::ELIMINATION).unwrap();
    assert!(matches!(recv.wait(), Err(AssemblyError::Communication(_))));
    assert!(matches!(
        world[0].isend(1, CommTag::ELIMINATION, &[1]),
        Err(AssemblyError::Communication(_))
    ));
}
