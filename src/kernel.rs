//! Local kernels: the per-element coefficient values and their sparsity template.
//!
//! A [`LocalKernel`] is invoked once per assembler. It receives the coordinates of the
//! low-order-refined vertices of every element and produces a [`LocalSparsity`] template
//! together with an [`ElementValues`] tensor aligned with it.
use crate::form::DiscretizationKind;
use crate::sparsity::{lexicographic_coords, LocalSparsity};
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Element-local coefficient values, aligned with a [`LocalSparsity`] template.
///
/// The value of candidate nonzero `k` in local row `r` of element `e` is stored at
/// `k + nnz_per_row * (r + dofs_per_element * e)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementValues<T> {
    nnz_per_row: usize,
    dofs_per_element: usize,
    num_elements: usize,
    data: Vec<T>,
}

impl<T: Real> ElementValues<T> {
    pub fn zeros(nnz_per_row: usize, dofs_per_element: usize, num_elements: usize) -> Self {
        Self {
            nnz_per_row,
            dofs_per_element,
            num_elements,
            data: vec![T::zero(); nnz_per_row * dofs_per_element * num_elements],
        }
    }
}

impl<T> ElementValues<T> {
    pub fn try_from_vec(
        nnz_per_row: usize,
        dofs_per_element: usize,
        num_elements: usize,
        data: Vec<T>,
    ) -> eyre::Result<Self> {
        let expected = nnz_per_row * dofs_per_element * num_elements;
        if data.len() != expected {
            return Err(eyre!(
                "Element values have length {}, expected {} ({} x {} x {})",
                data.len(),
                expected,
                nnz_per_row,
                dofs_per_element,
                num_elements
            ));
        }
        Ok(Self {
            nnz_per_row,
            dofs_per_element,
            num_elements,
            data,
        })
    }

    pub fn nnz_per_row(&self) -> usize {
        self.nnz_per_row
    }

    pub fn dofs_per_element(&self) -> usize {
        self.dofs_per_element
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn offset(&self, k: usize, row_slot: usize, element: usize) -> usize {
        k + self.nnz_per_row * (row_slot + self.dofs_per_element * element)
    }

    #[inline]
    pub fn get(&self, k: usize, row_slot: usize, element: usize) -> &T {
        &self.data[self.offset(k, row_slot, element)]
    }

    #[inline]
    pub fn get_mut(&mut self, k: usize, row_slot: usize, element: usize) -> &mut T {
        let offset = self.offset(k, row_slot, element);
        &mut self.data[offset]
    }
}

impl<T: Send> ElementValues<T> {
    /// Parallel iterator over the values of each element.
    pub fn par_elements_mut(&mut self) -> impl '_ + IndexedParallelIterator<Item = &mut [T]> {
        let len = (self.nnz_per_row * self.dofs_per_element).max(1);
        self.data.par_chunks_mut(len)
    }
}

/// Coordinates of the low-order-refined vertices of every element.
///
/// Coordinate `d` of vertex `v` of element `e` is stored at
/// `d + dim * (v + vertices_per_element * e)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorVertexCoordinates<T> {
    dim: usize,
    vertices_per_element: usize,
    num_elements: usize,
    data: Vec<T>,
}

impl<T> LorVertexCoordinates<T> {
    pub fn try_from_vec(
        dim: usize,
        vertices_per_element: usize,
        num_elements: usize,
        data: Vec<T>,
    ) -> eyre::Result<Self> {
        if data.len() != dim * vertices_per_element * num_elements {
            return Err(eyre!(
                "Vertex coordinate buffer has length {}, expected {}",
                data.len(),
                dim * vertices_per_element * num_elements
            ));
        }
        Ok(Self {
            dim,
            vertices_per_element,
            num_elements,
            data,
        })
    }

    /// A buffer without any vertices, for kernels that do not use geometry.
    pub fn empty() -> Self {
        Self {
            dim: 0,
            vertices_per_element: 0,
            num_elements: 0,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vertices_per_element(&self) -> usize {
        self.vertices_per_element
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn vertex(&self, element: usize, vertex: usize) -> &[T] {
        let begin = self.dim * (vertex + self.vertices_per_element * element);
        &self.data[begin..begin + self.dim]
    }
}

/// Supplies the coordinates of the low-order-refined vertices of a discretization.
pub trait VertexGeometryProvider<T> {
    fn lor_vertex_coordinates(&self) -> eyre::Result<LorVertexCoordinates<T>>;
}

impl<T: Clone> VertexGeometryProvider<T> for LorVertexCoordinates<T> {
    fn lor_vertex_coordinates(&self) -> eyre::Result<LorVertexCoordinates<T>> {
        Ok(self.clone())
    }
}

/// No geometry.
impl<T> VertexGeometryProvider<T> for () {
    fn lor_vertex_coordinates(&self) -> eyre::Result<LorVertexCoordinates<T>> {
        Ok(LorVertexCoordinates::empty())
    }
}

/// The output of a [`LocalKernel`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMatrices<T> {
    pub sparsity: LocalSparsity,
    pub values: ElementValues<T>,
}

/// Computes the local sparsity template and element values of one discretization kind.
pub trait LocalKernel<T>: Sync {
    /// The discretization kind the kernel computes coefficients for.
    fn kind(&self) -> DiscretizationKind;

    fn assemble(&self, vertices: &LorVertexCoordinates<T>) -> eyre::Result<LocalMatrices<T>>;
}

/// A kernel returning precomputed values.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedKernel<T> {
    kind: DiscretizationKind,
    matrices: LocalMatrices<T>,
}

impl<T: Real> TabulatedKernel<T> {
    pub fn new(kind: DiscretizationKind, sparsity: LocalSparsity, values: ElementValues<T>) -> eyre::Result<Self> {
        if sparsity.nnz_per_row() != values.nnz_per_row() || sparsity.dofs_per_element() != values.dofs_per_element() {
            return Err(eyre!(
                "Element values ({} x {}) are not aligned with the sparsity template ({} x {})",
                values.nnz_per_row(),
                values.dofs_per_element(),
                sparsity.nnz_per_row(),
                sparsity.dofs_per_element()
            ));
        }
        Ok(Self {
            kind,
            matrices: LocalMatrices { sparsity, values },
        })
    }

    /// Tabulate dense element matrices through a sparsity template.
    ///
    /// Entries of the element matrices outside of the template are ignored.
    pub fn from_element_matrices(
        kind: DiscretizationKind,
        sparsity: LocalSparsity,
        element_matrices: &[DMatrix<T>],
    ) -> eyre::Result<Self> {
        let n = sparsity.dofs_per_element();
        let mut values = ElementValues::zeros(sparsity.nnz_per_row(), n, element_matrices.len());
        for (element, matrix) in element_matrices.iter().enumerate() {
            if matrix.shape() != (n, n) {
                return Err(eyre!(
                    "Element matrix {} has shape {:?}, expected ({}, {})",
                    element,
                    matrix.shape(),
                    n,
                    n
                ));
            }
            for row in 0..n {
                for (k, col) in sparsity.row_columns(row) {
                    *values.get_mut(k, row, element) = matrix[(row, col)];
                }
            }
        }
        Self::new(kind, sparsity, values)
    }
}

impl<T: Real> LocalKernel<T> for TabulatedKernel<T> {
    fn kind(&self) -> DiscretizationKind {
        self.kind
    }

    fn assemble(&self, _vertices: &LorVertexCoordinates<T>) -> eyre::Result<LocalMatrices<T>> {
        Ok(self.matrices.clone())
    }
}

/// Diffusion and mass on the low-order-refined mesh of tensor-product H1 elements.
///
/// Each element of order `p` is split into `p^dim` multilinear sub-elements whose vertices are
/// the `(p + 1)^dim` nodes of the element. The form
/// $\int \kappa \nabla u \cdot \nabla v + \rho u v$ is integrated exactly (for affine
/// sub-elements) with a two-point Gauss rule per direction, and the sub-element matrices are
/// summed into the `3^dim` nearest-neighbor stencil of each node.
#[derive(Debug, Clone, PartialEq)]
pub struct H1LorKernel<T> {
    dim: usize,
    order: usize,
    diffusion: T,
    mass: T,
}

impl<T: Real> H1LorKernel<T> {
    pub fn new(dim: usize, order: usize) -> Self {
        Self {
            dim,
            order,
            diffusion: T::one(),
            mass: T::zero(),
        }
    }

    pub fn with_diffusion(self, diffusion: T) -> Self {
        Self { diffusion, ..self }
    }

    pub fn with_mass(self, mass: T) -> Self {
        Self { mass, ..self }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

impl<T: Real> LocalKernel<T> for H1LorKernel<T> {
    fn kind(&self) -> DiscretizationKind {
        DiscretizationKind::H1
    }

    fn assemble(&self, vertices: &LorVertexCoordinates<T>) -> eyre::Result<LocalMatrices<T>> {
        if !(1..=3).contains(&self.dim) || self.order == 0 {
            return Err(eyre!(
                "H1 LOR kernel requires dimension 1-3 and positive order, got dim = {}, order = {}",
                self.dim,
                self.order
            ));
        }
        let sparsity = LocalSparsity::tensor_stencil(self.dim, self.order);
        let n = sparsity.dofs_per_element();
        if vertices.dim() != self.dim || vertices.vertices_per_element() != n {
            return Err(eyre!(
                "Expected {} vertices of dimension {} per element, got {} of dimension {}",
                n,
                self.dim,
                vertices.vertices_per_element(),
                vertices.dim()
            ));
        }

        let mut values = ElementValues::zeros(sparsity.nnz_per_row(), n, vertices.num_elements());
        values
            .par_elements_mut()
            .enumerate()
            .try_for_each(|(element, element_values)| {
                self.assemble_element_into(element_values, sparsity.nnz_per_row(), vertices, element)
            })?;

        Ok(LocalMatrices { sparsity, values })
    }
}

impl<T: Real> H1LorKernel<T> {
    fn assemble_element_into(
        &self,
        output: &mut [T],
        nnz_per_row: usize,
        vertices: &LorVertexCoordinates<T>,
        element: usize,
    ) -> eyre::Result<()> {
        let dim = self.dim;
        let n1d = self.order + 1;
        let num_corners = 1 << dim;

        let mut cell = vec![0; dim];
        let mut corner_offsets = vec![0; dim];
        let mut corner_nodes = vec![0; num_corners];
        let mut corner_coords = DMatrix::zeros(dim, num_corners);

        for cell_index in 0..self.order.pow(dim as u32) {
            lexicographic_coords(cell_index, self.order, &mut cell);
            for corner in 0..num_corners {
                lexicographic_coords(corner, 2, &mut corner_offsets);
                let mut node = 0;
                let mut stride = 1;
                for (c, o) in cell.iter().zip(&corner_offsets) {
                    node += (c + o) * stride;
                    stride *= n1d;
                }
                corner_nodes[corner] = node;
                corner_coords
                    .column_mut(corner)
                    .copy_from_slice(vertices.vertex(element, node));
            }

            let cell_matrix = self.sub_element_matrix(&corner_coords)?;

            // The column of corner b, seen from corner a, sits at stencil offset b - a
            for a in 0..num_corners {
                for b in 0..num_corners {
                    let mut k = 0;
                    let mut stride = 1;
                    for d in 0..dim {
                        let offset = 1 + ((b >> d) & 1) - ((a >> d) & 1);
                        k += offset * stride;
                        stride *= 3;
                    }
                    output[k + nnz_per_row * corner_nodes[a]] += cell_matrix[(a, b)];
                }
            }
        }
        Ok(())
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn sub_element_matrix(&self, corner_coords: &DMatrix<T>) -> eyre::Result<DMatrix<T>> {
        let dim = self.dim;
        let num_corners = 1 << dim;
        let gauss_offset = 0.5 / (3.0).sqrt();
        let gauss_points = [0.5 - gauss_offset, 0.5 + gauss_offset];
        let weight = (0.5).powi(dim as i32);

        let mut matrix = DMatrix::zeros(num_corners, num_corners);
        let mut phi = DVector::zeros(num_corners);
        let mut ref_gradients = DMatrix::zeros(dim, num_corners);

        for q in 0..num_corners {
            let xi: Vec<T> = (0..dim).map(|d| gauss_points[(q >> d) & 1]).collect();
            for a in 0..num_corners {
                let factor = |d: usize| if (a >> d) & 1 == 1 { xi[d] } else { 1.0 - xi[d] };
                let derivative = |d: usize| if (a >> d) & 1 == 1 { 1.0 } else { -1.0 };
                phi[a] = (0..dim).map(factor).fold(T::one(), |acc, f| acc * f);
                for d in 0..dim {
                    ref_gradients[(d, a)] = (0..dim)
                        .map(|e| if e == d { derivative(e) } else { factor(e) })
                        .fold(T::one(), |acc, f| acc * f);
                }
            }

            let jacobian = corner_coords * ref_gradients.transpose();
            let det = jacobian.determinant();
            let inverse = jacobian
                .try_inverse()
                .ok_or_else(|| eyre!("Singular LOR sub-element Jacobian encountered"))?;
            let gradients = inverse.transpose() * &ref_gradients;
            let scale = weight * det.abs();

            matrix += (gradients.transpose() * &gradients) * (self.diffusion * scale);
            matrix += (&phi * phi.transpose()) * (self.mass * scale);
        }
        Ok(matrix)
    }
}
