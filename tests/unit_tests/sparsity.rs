use fenris_lor::error::AssemblyError;
use fenris_lor::sparsity::LocalSparsity;

#[test]
fn dense_template_maps_candidate_to_column() {
    let sparsity = LocalSparsity::dense(3);
    assert_eq!(sparsity.nnz_per_row(), 3);
    assert_eq!(sparsity.num_present(), 9);
    for row in 0..3 {
        let columns: Vec<_> = sparsity.row_columns(row).collect();
        assert_eq!(columns, vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(sparsity.find_slot(row, 2), Some(2));
    }
}

#[test]
fn tensor_stencil_1d_order_2() {
    // Nodes 0 - 1 - 2, offsets (-1, 0, +1)
    let sparsity = LocalSparsity::tensor_stencil(1, 2);
    assert_eq!(sparsity.dofs_per_element(), 3);
    assert_eq!(sparsity.nnz_per_row(), 3);
    #[rustfmt::skip]
    let expected = vec![
        None,    Some(0), Some(1),
        Some(0), Some(1), Some(2),
        Some(1), Some(2), None,
    ];
    assert_eq!(sparsity.mapping(), expected.as_slice());
    assert_eq!(sparsity.find_slot(2, 0), None);
    assert_eq!(sparsity.find_slot(2, 1), Some(0));
}

#[test]
fn tensor_stencil_2d_corner_and_center() {
    let sparsity = LocalSparsity::tensor_stencil(2, 2);
    assert_eq!(sparsity.dofs_per_element(), 9);
    assert_eq!(sparsity.nnz_per_row(), 9);

    // Corner node 0 couples to itself and nodes 1, 3, 4
    let corner: Vec<_> = sparsity.row_columns(0).map(|(_, col)| col).collect();
    assert_eq!(corner, vec![0, 1, 3, 4]);
    // The diagonal of every row sits at the center offset
    for row in 0..9 {
        assert_eq!(sparsity.column(row, 4), Some(row));
    }
    // Center node 4 couples to all nodes, in lexicographic order
    let center: Vec<_> = sparsity.row_columns(4).map(|(_, col)| col).collect();
    assert_eq!(center, (0..9).collect::<Vec<_>>());
    // 4 corners x 4 + 4 edges x 6 + 1 center x 9
    assert_eq!(sparsity.num_present(), 16 + 24 + 9);
}

#[test]
fn tensor_stencil_is_symmetric() {
    for dim in 1..=3 {
        for order in 1..=3 {
            let sparsity = LocalSparsity::tensor_stencil(dim, order);
            for row in 0..sparsity.dofs_per_element() {
                for (_, col) in sparsity.row_columns(row) {
                    assert!(sparsity.find_slot(col, row).is_some(), "dim {}, order {}", dim, order);
                }
            }
        }
    }
}

#[test]
fn invalid_mappings_are_rejected() {
    let wrong_len = LocalSparsity::try_from_mapping(2, 2, vec![Some(0); 3]);
    assert!(matches!(wrong_len, Err(AssemblyError::Verification(_))));

    let out_of_bounds = LocalSparsity::try_from_mapping(2, 1, vec![Some(0), Some(2)]);
    assert!(matches!(out_of_bounds, Err(AssemblyError::Verification(_))));

    let duplicate = LocalSparsity::try_from_mapping(2, 2, vec![Some(1), Some(1), None, Some(0)]);
    assert!(matches!(duplicate, Err(AssemblyError::Verification(_))));

    let valid = LocalSparsity::try_from_mapping(2, 2, vec![Some(1), None, None, Some(0)]).unwrap();
    assert_eq!(valid.num_present(), 2);
    assert_eq!(valid.column(0, 1), None);
}
