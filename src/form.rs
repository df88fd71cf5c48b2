//! Descriptions of bilinear forms and the batched-assembly feasibility check.
use crate::error::{AssemblyError, Result};
use serde::{Deserialize, Serialize};

/// The conformity of the finite element space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscretizationKind {
    /// Continuous, scalar (H1-conforming) elements.
    H1,
    /// Tangentially continuous (curl-conforming, Nédélec) elements.
    Nedelec,
    /// Normally continuous (div-conforming, Raviart-Thomas) elements.
    RaviartThomas,
}

/// The domain integrators making up a bilinear form.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegratorKind {
    Diffusion,
    Mass,
    CurlCurl,
    DivDiv,
    VectorMass,
    /// Any integrator the batched path does not know about.
    Other,
}

impl DiscretizationKind {
    /// The pair of integrators the batched path handles for this kind.
    pub fn supported_integrators(&self) -> [IntegratorKind; 2] {
        use IntegratorKind::*;
        match self {
            DiscretizationKind::H1 => [Diffusion, Mass],
            DiscretizationKind::Nedelec => [CurlCurl, VectorMass],
            DiscretizationKind::RaviartThomas => [DivDiv, VectorMass],
        }
    }

    /// Whether the kind's pair of integrators covers the given list.
    ///
    /// Accepted lists contain one integrator of the pair, or both (in either order).
    pub fn has_integrators(&self, integrators: &[IntegratorKind]) -> bool {
        let [a, b] = self.supported_integrators();
        match integrators {
            [i0] => *i0 == a || *i0 == b,
            [i0, i1] => (*i0 == a && *i1 == b) || (*i0 == b && *i1 == a),
            _ => false,
        }
    }
}

/// A description of a bilinear form on a finite element space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDescriptor {
    pub kind: DiscretizationKind,
    /// Whether every element of the space uses a tensor-product basis.
    pub tensor_basis: bool,
    /// The domain integrators of the form, in the order they were added.
    pub integrators: Vec<IntegratorKind>,
}

impl FormDescriptor {
    pub fn new(kind: DiscretizationKind) -> Self {
        Self {
            kind,
            tensor_basis: true,
            integrators: Vec::new(),
        }
    }

    pub fn with_integrator(mut self, integrator: IntegratorKind) -> Self {
        self.integrators.push(integrator);
        self
    }

    pub fn with_tensor_basis(self, tensor_basis: bool) -> Self {
        Self { tensor_basis, ..self }
    }

    /// Whether the batched path can assemble this form.
    pub fn is_supported(&self) -> bool {
        self.check_supported().is_ok()
    }

    /// Like [`is_supported`](Self::is_supported), but reports the reason and returns the
    /// selected discretization kind on success.
    pub fn check_supported(&self) -> Result<DiscretizationKind> {
        if !self.tensor_basis {
            return Err(AssemblyError::Unsupported(
                "batched assembly requires tensor-product elements".to_string(),
            ));
        }
        if !self.kind.has_integrators(&self.integrators) {
            return Err(AssemblyError::Unsupported(format!(
                "{:?} spaces support one or both of {:?}, got {:?}",
                self.kind,
                self.kind.supported_integrators(),
                self.integrators
            )));
        }
        Ok(self.kind)
    }
}
