//! Batched assembly of low-order-refined (LOR) finite element matrices.
//!
//! Every element of a discretization contributes a small, fixed-pattern set of coefficients
//! to the global degrees of freedom (DOFs) it shares with its neighbors. Instead of
//! scattering element matrices one at a time, the assembler builds the global CSR matrix
//! directly from
//!
//! - a [local sparsity template](sparsity::LocalSparsity) shared by all elements,
//! - a [tensor of element-local values](kernel::ElementValues), and
//! - the [element/DOF incidence relation](incidence::ElementRestriction),
//!
//! in two data-parallel passes: a row-count pass sizing the CSR storage, and a fill pass
//! writing every distinct `(row, col)` entry exactly once. Entries shared by several
//! elements are summed by a single, statically elected owner element, so the passes need
//! no locks and produce deterministic values.
//!
//! The [`parallel`] module provides the distributed variant, where each domain assembles its
//! own block and essential (Dirichlet) DOFs are eliminated across domain boundaries.
use nalgebra::RealField;

pub mod assembly;
pub mod error;
pub mod form;
pub mod incidence;
pub mod kernel;
pub mod options;
pub mod parallel;
pub mod procedural;
pub mod signed;
pub mod sparsity;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use error::{AssemblyError, Result};

/// The scalar type used throughout the crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
