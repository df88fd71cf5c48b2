//! Element/DOF incidence.
//!
//! An [`ElementRestriction`] maps element-local DOF slots to (signed) global DOFs, and stores
//! the transpose relation: for each global DOF, the list of `(element, local slot)` pairs
//! referencing it. The transpose is stored in CSR-like form, with the list of each DOF ordered
//! by increasing element index.
use crate::error::{AssemblyError, Result};
use crate::signed::SignedIndex;
use crate::Real;
use log::debug;
use serde::{Deserialize, Serialize};

/// Produces the incidence relation of a discretization.
pub trait IncidenceProvider {
    /// Build the restriction (gather map and incidence table) of the discretization.
    fn element_restriction(&self) -> Result<ElementRestriction>;
}

/// One element's reference to a global DOF.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IncidentSlot {
    pub element: usize,
    /// The element-local slot, carrying the orientation with which the element sees the DOF.
    pub slot: SignedIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRestriction {
    num_dofs: usize,
    dofs_per_element: usize,
    num_elements: usize,
    /// Signed global DOF of each element-local slot, element-major.
    gather_map: Vec<SignedIndex>,
    /// Offsets into `indices` for each global DOF.
    offsets: Vec<usize>,
    /// Signed element-vector indices `dofs_per_element * element + slot`.
    indices: Vec<SignedIndex>,
}

impl ElementRestriction {
    /// Build the restriction from an element-major gather map.
    ///
    /// Entry `dofs_per_element * e + s` of the gather map holds the signed global DOF of local
    /// slot `s` of element `e`.
    pub fn try_from_gather_map(
        num_dofs: usize,
        dofs_per_element: usize,
        gather_map: Vec<SignedIndex>,
    ) -> Result<Self> {
        if dofs_per_element == 0 {
            if gather_map.is_empty() {
                return Ok(Self {
                    num_dofs,
                    dofs_per_element,
                    num_elements: 0,
                    gather_map,
                    offsets: vec![0; num_dofs + 1],
                    indices: Vec::new(),
                });
            }
            return Err(AssemblyError::verification(
                "gather map is non-empty, but elements have no DOFs",
            ));
        }
        if gather_map.len() % dofs_per_element != 0 {
            return Err(AssemblyError::verification(format!(
                "gather map length {} is not a multiple of {} DOFs per element",
                gather_map.len(),
                dofs_per_element
            )));
        }
        if let Some(bad) = gather_map.iter().find(|dof| dof.index() >= num_dofs) {
            return Err(AssemblyError::verification(format!(
                "gather map references DOF {} but the space only has {} DOFs",
                bad.index(),
                num_dofs
            )));
        }

        let num_elements = gather_map.len() / dofs_per_element;

        let mut offsets = vec![0usize; num_dofs + 1];
        for dof in &gather_map {
            offsets[dof.index() + 1] += 1;
        }
        for i in 0..num_dofs {
            offsets[i + 1] += offsets[i];
        }

        // Elements are visited in increasing order, so every list ends up sorted by element
        let mut cursor = offsets.clone();
        let mut indices = vec![SignedIndex::positive(0); gather_map.len()];
        for (e_index, dof) in gather_map.iter().enumerate() {
            let position = &mut cursor[dof.index()];
            indices[*position] = dof.with_index(e_index);
            *position += 1;
        }

        debug!(
            "Built element restriction: {} DOFs, {} elements, {} DOFs per element",
            num_dofs, num_elements, dofs_per_element
        );

        Ok(Self {
            num_dofs,
            dofs_per_element,
            num_elements,
            gather_map,
            offsets,
            indices,
        })
    }

    /// Build the restriction from per-element DOF lists.
    pub fn try_from_element_dofs(num_dofs: usize, element_dofs: &[Vec<SignedIndex>]) -> Result<Self> {
        let dofs_per_element = element_dofs.first().map(Vec::len).unwrap_or(0);
        if element_dofs.iter().any(|dofs| dofs.len() != dofs_per_element) {
            return Err(AssemblyError::verification(
                "all elements must have the same number of DOFs",
            ));
        }
        let gather_map = element_dofs.iter().flatten().copied().collect();
        Self::try_from_gather_map(num_dofs, dofs_per_element, gather_map)
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn dofs_per_element(&self) -> usize {
        self.dofs_per_element
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn gather_map(&self) -> &[SignedIndex] {
        &self.gather_map
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn indices(&self) -> &[SignedIndex] {
        &self.indices
    }

    /// The signed global DOF of a local slot of an element.
    #[inline]
    pub fn element_dof(&self, element: usize, slot: usize) -> SignedIndex {
        self.gather_map[self.dofs_per_element * element + slot]
    }

    /// The signed global DOFs of an element.
    pub fn element_dofs(&self, element: usize) -> &[SignedIndex] {
        let begin = self.dofs_per_element * element;
        &self.gather_map[begin..begin + self.dofs_per_element]
    }

    /// The number of element slots referencing the given DOF.
    #[inline]
    pub fn degree(&self, dof: usize) -> usize {
        self.offsets[dof + 1] - self.offsets[dof]
    }

    pub fn max_degree(&self) -> usize {
        (0..self.num_dofs).map(|dof| self.degree(dof)).max().unwrap_or(0)
    }

    /// Fails with [`AssemblyError::DegreeExceeded`] if any DOF is referenced by more than `max`
    /// element slots.
    pub fn check_degree(&self, max: usize) -> Result<()> {
        match (0..self.num_dofs).find(|&dof| self.degree(dof) > max) {
            Some(dof) => Err(AssemblyError::DegreeExceeded {
                dof,
                degree: self.degree(dof),
                max,
            }),
            None => Ok(()),
        }
    }

    /// The raw signed element-vector indices referencing a DOF.
    #[inline]
    pub fn incident_indices(&self, dof: usize) -> &[SignedIndex] {
        &self.indices[self.offsets[dof]..self.offsets[dof + 1]]
    }

    /// Iterate over the `(element, local slot)` pairs referencing a DOF, by increasing element.
    pub fn incidence(&self, dof: usize) -> impl '_ + ExactSizeIterator<Item = IncidentSlot> {
        let n = self.dofs_per_element;
        self.incident_indices(dof).iter().map(move |e_index| IncidentSlot {
            element: e_index.index() / n,
            slot: e_index.with_index(e_index.index() % n),
        })
    }

    /// Gather an L-vector (one value per global DOF) into an E-vector (one value per element slot),
    /// applying orientation signs.
    pub fn gather<T: Real>(&self, l_vector: &[T], e_vector: &mut [T]) {
        assert_eq!(l_vector.len(), self.num_dofs, "L-vector length must match number of DOFs");
        assert_eq!(e_vector.len(), self.gather_map.len(), "E-vector length must match gather map");
        for (e_value, dof) in e_vector.iter_mut().zip(&self.gather_map) {
            let value = l_vector[dof.index()];
            *e_value = if dof.is_reversed() { -value } else { value };
        }
    }

    /// Accumulate an E-vector into an L-vector, the transpose of [`gather`](Self::gather).
    pub fn scatter_add<T: Real>(&self, e_vector: &[T], l_vector: &mut [T]) {
        assert_eq!(l_vector.len(), self.num_dofs, "L-vector length must match number of DOFs");
        assert_eq!(e_vector.len(), self.gather_map.len(), "E-vector length must match gather map");
        for dof in 0..self.num_dofs {
            let mut sum = T::zero();
            for e_index in self.incident_indices(dof) {
                let value = e_vector[e_index.index()];
                sum += if e_index.is_reversed() { -value } else { value };
            }
            l_vector[dof] += sum;
        }
    }
}

impl IncidenceProvider for ElementRestriction {
    fn element_restriction(&self) -> Result<ElementRestriction> {
        Ok(self.clone())
    }
}
