//! Strategies for random incidence problems.
use crate::incidence::ElementRestriction;
use crate::signed::SignedIndex;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use ::proptest::sample::subsequence;
use nalgebra::DMatrix;

/// A random discretization: elements referencing distinct, randomly oriented DOFs, each with a
/// dense element matrix.
#[derive(Debug, Clone)]
pub struct IncidenceProblem {
    pub restriction: ElementRestriction,
    pub element_matrices: Vec<DMatrix<f64>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IncidenceProblemParams {
    pub max_dofs: usize,
    pub max_dofs_per_element: usize,
    pub max_elements: usize,
    /// Whether DOFs may be seen with reversed orientation.
    pub oriented: bool,
}

impl Default for IncidenceProblemParams {
    fn default() -> Self {
        Self {
            max_dofs: 10,
            max_dofs_per_element: 4,
            max_elements: 6,
            oriented: true,
        }
    }
}

impl IncidenceProblemParams {
    pub fn with_oriented(self, oriented: bool) -> Self {
        Self { oriented, ..self }
    }
}

impl Arbitrary for IncidenceProblem {
    type Parameters = IncidenceProblemParams;
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(params: Self::Parameters) -> Self::Strategy {
        let IncidenceProblemParams {
            max_dofs,
            max_dofs_per_element,
            max_elements,
            oriented,
        } = params;
        (1..=max_dofs_per_element)
            .prop_flat_map(move |n| (Just(n), n..=max_dofs.max(n), 0..=max_elements))
            .prop_flat_map(move |(n, num_dofs, num_elements)| {
                let all_dofs: Vec<usize> = (0..num_dofs).collect();
                let element_dofs = subsequence(all_dofs, n).prop_shuffle();
                let orientation = if oriented { any::<bool>().boxed() } else { Just(false).boxed() };
                let element = (element_dofs, vec(orientation, n), vec(-5.0..5.0, n * n));
                (Just(n), Just(num_dofs), vec(element, num_elements))
            })
            .prop_map(|(n, num_dofs, elements)| {
                let mut gather_map = Vec::with_capacity(n * elements.len());
                let mut element_matrices = Vec::with_capacity(elements.len());
                for (dofs, reversed, values) in elements {
                    gather_map.extend(
                        dofs.iter()
                            .zip(&reversed)
                            .map(|(&dof, &reversed)| SignedIndex::new(dof, reversed)),
                    );
                    element_matrices.push(DMatrix::from_row_slice(n, n, &values));
                }
                let restriction = ElementRestriction::try_from_gather_map(num_dofs, n, gather_map)
                    .expect("Generated gather map must be valid");
                IncidenceProblem {
                    restriction,
                    element_matrices,
                }
            })
            .boxed()
    }
}
