use fenris_lor::error::AssemblyError;
use fenris_lor::form::{DiscretizationKind, FormDescriptor, IntegratorKind};

use DiscretizationKind::*;
use IntegratorKind::*;

#[test]
fn supported_integrator_pairs() {
    let cases = [
        (H1, vec![Diffusion], true),
        (H1, vec![Mass], true),
        (H1, vec![Diffusion, Mass], true),
        (H1, vec![Mass, Diffusion], true),
        (Nedelec, vec![CurlCurl, VectorMass], true),
        (Nedelec, vec![VectorMass], true),
        (RaviartThomas, vec![DivDiv, VectorMass], true),
        (RaviartThomas, vec![VectorMass, DivDiv], true),
        (H1, vec![], false),
        (H1, vec![Diffusion, Diffusion], false),
        (H1, vec![Diffusion, Mass, Mass], false),
        (H1, vec![CurlCurl], false),
        (Nedelec, vec![DivDiv, VectorMass], false),
        (RaviartThomas, vec![CurlCurl], false),
        (RaviartThomas, vec![Other], false),
    ];

    for (kind, integrators, expected) in cases {
        let form = integrators
            .iter()
            .fold(FormDescriptor::new(kind), |form, &integrator| form.with_integrator(integrator));
        assert_eq!(form.is_supported(), expected, "{:?} with {:?}", kind, integrators);
    }
}

#[test]
fn non_tensor_basis_is_not_supported() {
    let form = FormDescriptor::new(H1)
        .with_integrator(Diffusion)
        .with_tensor_basis(false);
    assert!(matches!(form.check_supported(), Err(AssemblyError::Unsupported(_))));
}

#[test]
fn check_selects_kind() {
    let form = FormDescriptor::new(Nedelec)
        .with_integrator(VectorMass)
        .with_integrator(CurlCurl);
    assert_eq!(form.check_supported().unwrap(), Nedelec);
}
