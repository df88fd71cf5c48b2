use fenris_lor::error::AssemblyError;
use fenris_lor::incidence::{ElementRestriction, IncidentSlot};
use fenris_lor::proptest::IncidenceProblem;
use fenris_lor::signed::SignedIndex;
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;

fn two_segments() -> ElementRestriction {
    // 0 -- 1 -- 2, with the second segment seeing DOF 1 reversed
    let elements = vec![
        vec![SignedIndex::positive(0), SignedIndex::positive(1)],
        vec![SignedIndex::reversed(1), SignedIndex::positive(2)],
    ];
    ElementRestriction::try_from_element_dofs(3, &elements).unwrap()
}

#[test]
fn incidence_lists_are_ordered_by_element() {
    let restriction = two_segments();
    assert_eq!(restriction.num_elements(), 2);
    assert_eq!(restriction.offsets(), &[0, 1, 3, 4]);
    assert_eq!(
        restriction.indices(),
        &[
            SignedIndex::positive(0),
            SignedIndex::positive(1),
            SignedIndex::reversed(2),
            SignedIndex::positive(3)
        ]
    );
    assert_eq!(restriction.degree(0), 1);
    assert_eq!(restriction.degree(1), 2);
    assert_eq!(restriction.max_degree(), 2);

    let shared: Vec<_> = restriction.incidence(1).collect();
    assert_eq!(
        shared,
        vec![
            IncidentSlot {
                element: 0,
                slot: SignedIndex::positive(1)
            },
            IncidentSlot {
                element: 1,
                slot: SignedIndex::reversed(0)
            },
        ]
    );
    // Raw E-vector indices keep the orientation of the gather map
    assert_eq!(restriction.incident_indices(1), &[SignedIndex::positive(1), SignedIndex::reversed(2)]);
}

#[test]
fn gather_and_scatter_apply_orientation() {
    let restriction = two_segments();
    let mut e_vector = vec![0.0; 4];
    restriction.gather(&[1.0, 2.0, 3.0], &mut e_vector);
    assert_eq!(e_vector, vec![1.0, 2.0, -2.0, 3.0]);

    let mut l_vector = vec![0.0; 3];
    restriction.scatter_add(&[1.0, 1.0, 1.0, 1.0], &mut l_vector);
    assert_eq!(l_vector, vec![1.0, 0.0, 1.0]);
}

#[test]
fn invalid_gather_maps_are_rejected() {
    let out_of_bounds =
        ElementRestriction::try_from_gather_map(2, 2, vec![SignedIndex::positive(0), SignedIndex::reversed(2)]);
    assert!(matches!(out_of_bounds, Err(AssemblyError::Verification(_))));

    let ragged = ElementRestriction::try_from_gather_map(4, 3, vec![SignedIndex::positive(0); 4]);
    assert!(matches!(ragged, Err(AssemblyError::Verification(_))));

    let uneven = ElementRestriction::try_from_element_dofs(
        3,
        &[vec![SignedIndex::positive(0)], vec![SignedIndex::positive(1), SignedIndex::positive(2)]],
    );
    assert!(matches!(uneven, Err(AssemblyError::Verification(_))));
}

#[test]
fn degree_check_reports_offending_dof() {
    let elements: Vec<_> = (0..5).map(|_| vec![SignedIndex::positive(3)]).collect();
    let restriction = ElementRestriction::try_from_element_dofs(4, &elements).unwrap();
    assert!(restriction.check_degree(5).is_ok());
    match restriction.check_degree(4) {
        Err(AssemblyError::DegreeExceeded { dof, degree, max }) => {
            assert_eq!((dof, degree, max), (3, 5, 4));
        }
        other => panic!("Expected degree error, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn every_element_slot_appears_in_exactly_one_incidence_list(problem in any::<IncidenceProblem>()) {
        let restriction = &problem.restriction;
        let n = restriction.dofs_per_element();
        let mut seen = vec![0usize; restriction.gather_map().len()];
        for dof in 0..restriction.num_dofs() {
            let elements: Vec<_> = restriction.incidence(dof).map(|slot| slot.element).collect();
            prop_assert!(elements.windows(2).all(|w| w[0] <= w[1]));
            for slot in restriction.incidence(dof) {
                let e_index = n * slot.element + slot.slot.index();
                seen[e_index] += 1;
                prop_assert_eq!(restriction.gather_map()[e_index].index(), dof);
                prop_assert_eq!(restriction.gather_map()[e_index].is_reversed(), slot.slot.is_reversed());
            }
        }
        prop_assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn scatter_is_transpose_of_gather(problem in any::<IncidenceProblem>()) {
        let restriction = &problem.restriction;
        let l: Vec<f64> = (0..restriction.num_dofs()).map(|i| i as f64 + 1.0).collect();
        let e: Vec<f64> = (0..restriction.gather_map().len()).map(|i| 0.5 * i as f64 - 1.0).collect();

        let mut gathered = vec![0.0; e.len()];
        restriction.gather(&l, &mut gathered);
        let mut scattered = vec![0.0; l.len()];
        restriction.scatter_add(&e, &mut scattered);

        let lhs: f64 = gathered.iter().zip(&e).map(|(a, b)| a * b).sum();
        let rhs: f64 = scattered.iter().zip(&l).map(|(a, b)| a * b).sum();
        assert_scalar_eq!(lhs, rhs, comp = abs, tol = 1e-9);
    }
}
