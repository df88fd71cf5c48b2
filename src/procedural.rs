//! Procedurally generated high-order H1 spaces on structured grids.
//!
//! Every cell of the grid is a tensor-product element of order `p` with its `(p + 1)^dim`
//! nodes at the Gauss-Lobatto points. The nodes double as the vertices of the low-order-refined
//! sub-elements, so each space comes with the vertex coordinates consumed by
//! [`H1LorKernel`](crate::kernel::H1LorKernel).
use crate::incidence::ElementRestriction;
use crate::kernel::LorVertexCoordinates;
use crate::parallel::ParallelLayout;
use crate::signed::SignedIndex;
use crate::sparsity::lexicographic_coords;
use crate::Real;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// A structured H1 space together with its LOR vertex geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredH1Space<T> {
    pub dim: usize,
    pub order: usize,
    pub restriction: ElementRestriction,
    pub vertices: LorVertexCoordinates<T>,
    /// The DOFs on the boundary of the domain, in increasing order.
    pub boundary_dofs: Vec<usize>,
}

/// The Gauss-Lobatto points of order `order` on `[0, 1]`, in increasing order.
pub fn gauss_lobatto_points(order: usize) -> Vec<f64> {
    assert!(order > 0, "Gauss-Lobatto points require positive order");
    let n = order;
    // Newton iteration for the roots of (1 - x^2) P_n'(x), starting from Chebyshev points
    let mut x: Vec<f64> = (0..=n)
        .map(|i| (std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect();
    for _ in 0..100 {
        let mut max_update: f64 = 0.0;
        for x_i in x.iter_mut() {
            let (mut p_prev, mut p) = (1.0, *x_i);
            for k in 2..=n {
                let k = k as f64;
                let p_next = ((2.0 * k - 1.0) * *x_i * p - (k - 1.0) * p_prev) / k;
                p_prev = p;
                p = p_next;
            }
            let update = (*x_i * p - p_prev) / ((n + 1) as f64 * p);
            *x_i -= update;
            max_update = max_update.max(update.abs());
        }
        if max_update < 1e-15 {
            break;
        }
    }
    x.iter().map(|x_i| 0.5 * (1.0 - x_i)).collect()
}

/// The unit interval split into `cells` elements of the given order.
pub fn unit_interval_h1<T: Real>(cells: usize, order: usize) -> StructuredH1Space<T> {
    unit_hypercube_h1(1, cells, order)
}

/// The unit square split into `cells_per_dim x cells_per_dim` elements of the given order.
pub fn unit_square_h1<T: Real>(cells_per_dim: usize, order: usize) -> StructuredH1Space<T> {
    unit_hypercube_h1(2, cells_per_dim, order)
}

pub fn unit_hypercube_h1<T: Real>(dim: usize, cells_per_dim: usize, order: usize) -> StructuredH1Space<T> {
    assert!((1..=3).contains(&dim), "Dimension must be 1, 2 or 3");
    assert!(cells_per_dim > 0, "Need at least one cell per dimension");
    let points = gauss_lobatto_points(order);
    let n1d = order + 1;
    let nodes_per_dim = cells_per_dim * order + 1;
    let num_dofs = nodes_per_dim.pow(dim as u32);
    let num_elements = cells_per_dim.pow(dim as u32);
    let nodes_per_element = n1d.pow(dim as u32);

    let mut gather_map = Vec::with_capacity(num_elements * nodes_per_element);
    let mut coordinates = Vec::with_capacity(num_elements * nodes_per_element * dim);
    let mut cell = vec![0; dim];
    let mut local = vec![0; dim];
    for element in 0..num_elements {
        lexicographic_coords(element, cells_per_dim, &mut cell);
        for node in 0..nodes_per_element {
            lexicographic_coords(node, n1d, &mut local);
            let mut global = 0;
            let mut stride = 1;
            for d in 0..dim {
                global += (cell[d] * order + local[d]) * stride;
                stride *= nodes_per_dim;
                let x = (cell[d] as f64 + points[local[d]]) / cells_per_dim as f64;
                coordinates.push(nalgebra::convert::<f64, T>(x));
            }
            gather_map.push(SignedIndex::positive(global));
        }
    }

    let mut grid = vec![0; dim];
    let boundary_dofs = (0..num_dofs)
        .filter(|&dof| {
            lexicographic_coords(dof, nodes_per_dim, &mut grid);
            grid.iter().any(|&g| g == 0 || g + 1 == nodes_per_dim)
        })
        .collect();

    let restriction = ElementRestriction::try_from_gather_map(num_dofs, nodes_per_element, gather_map)
        .expect("Structured gather map is always valid");
    let vertices = LorVertexCoordinates::try_from_vec(dim, nodes_per_element, num_elements, coordinates)
        .expect("Structured vertex buffer is always valid");

    StructuredH1Space {
        dim,
        order,
        restriction,
        vertices,
        boundary_dofs,
    }
}

/// The part of a distributed unit interval space held by one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalPartition<T> {
    /// The elements of the rank, with DOFs numbered locally.
    pub space: StructuredH1Space<T>,
    /// The global row partition and the local-to-global prolongation.
    pub layout: ParallelLayout<T>,
    /// Global indices of the local DOFs.
    pub local_to_global: Vec<usize>,
}

/// Split `unit_interval_h1(cells, order)` into contiguous blocks of elements, one per rank.
///
/// Rank `r` owns the global DOFs from the left end of its first element up to, but excluding,
/// the left end of the next rank's first element. The last rank also owns the right end of the
/// interval. Since the DOF at the right end of a rank's last element is owned by the next rank,
/// every rank except the last carries a non-trivial prolongation.
pub fn partition_unit_interval_h1<T: Real>(cells: usize, order: usize, ranks: usize) -> Vec<IntervalPartition<T>> {
    assert!(ranks > 0 && ranks <= cells, "Need between 1 and {} ranks", cells);
    let global = unit_interval_h1::<T>(cells, order);
    let element_starts: Vec<usize> = (0..=ranks).map(|r| r * cells / ranks).collect();
    let num_global_dofs = cells * order + 1;
    let mut row_starts: Vec<usize> = element_starts[..ranks].iter().map(|e| e * order).collect();
    row_starts.push(num_global_dofs);

    (0..ranks)
        .map(|rank| {
            let (first_element, end_element) = (element_starts[rank], element_starts[rank + 1]);
            let num_elements = end_element - first_element;
            let num_local_dofs = num_elements * order + 1;
            let first_dof = first_element * order;
            let local_to_global: Vec<usize> = (first_dof..first_dof + num_local_dofs).collect();

            let gather_map = (0..num_elements)
                .flat_map(|e| (0..=order).map(move |i| SignedIndex::positive(e * order + i)))
                .collect();
            let restriction = ElementRestriction::try_from_gather_map(num_local_dofs, order + 1, gather_map)
                .expect("Partition gather map is always valid");
            let vertex_data = (first_element..end_element)
                .flat_map(|element| global.vertices.data()[element * (order + 1)..(element + 1) * (order + 1)].to_vec())
                .collect();
            let vertices = LorVertexCoordinates::try_from_vec(1, order + 1, num_elements, vertex_data)
                .expect("Partition vertex buffer is always valid");
            let boundary_dofs = local_to_global
                .iter()
                .enumerate()
                .filter(|&(_, &g)| g == 0 || g + 1 == num_global_dofs)
                .map(|(local, _)| local)
                .collect();

            let mut coo = CooMatrix::new(num_local_dofs, num_global_dofs);
            for (local, &g) in local_to_global.iter().enumerate() {
                coo.push(local, g, T::one());
            }

            IntervalPartition {
                space: StructuredH1Space {
                    dim: 1,
                    order,
                    restriction,
                    vertices,
                    boundary_dofs,
                },
                layout: ParallelLayout::from_row_starts(row_starts.clone()).with_prolongation(CsrMatrix::from(&coo)),
                local_to_global,
            }
        })
        .collect()
}
