//! Error type shared by the serial and distributed assembly paths.
//!
//! Assembly has no recoverable failure modes: every error aborts the operation and no partial
//! matrix is returned.
use crate::form::DiscretizationKind;
use std::fmt;
use thiserror::Error;

/// Errors reported by batched assembly.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The discretization/integrator combination is not handled by the batched path.
    #[error("batched assembly is not supported for this form: {0}")]
    Unsupported(String),
    /// A global DOF is shared by more elements than the configured bound allows.
    #[error("DOF {dof} is shared by {degree} elements, but at most {max} are supported")]
    DegreeExceeded { dof: usize, degree: usize, max: usize },
    /// Collaborator data is inconsistent (bad DOF indices, mismatched sizes, ...).
    #[error("verification failed: {0}")]
    Verification(String),
    /// The local kernel was built for a different discretization kind than the form.
    #[error("kernel computes {found:?} coefficients, but the form requires {expected:?}")]
    KindMismatch {
        expected: DiscretizationKind,
        found: DiscretizationKind,
    },
    /// An element has no template slot for a `(row, col)` pair that another element asserts.
    #[error("local sparsity template has no entry for local row {row_slot}, column {col_slot}")]
    MissingTemplateEntry { row_slot: usize, col_slot: usize },
    /// The fill pass tried to write more entries into a row than the count pass reserved.
    #[error("fill pass exceeded the reserved storage of row {row}")]
    WriteBudgetExceeded { row: usize },
    /// The assembled arrays do not form a valid CSR matrix.
    #[error("assembled data is not a valid CSR matrix: {0}")]
    InvalidCsr(String),
    /// Message passing between domains failed.
    #[error("communication failure: {0}")]
    Communication(String),
    /// A local kernel or geometry provider failed.
    #[error("local kernel failed: {0}")]
    Kernel(KernelError),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Opaque wrapper around a kernel failure.
///
/// Kernels report errors through [`eyre`], in the same way element assemblers do.
pub struct KernelError(pub eyre::Report);

impl fmt::Debug for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<eyre::Report> for AssemblyError {
    fn from(report: eyre::Report) -> Self {
        AssemblyError::Kernel(KernelError(report))
    }
}

impl From<nalgebra_sparse::SparseFormatError> for AssemblyError {
    fn from(err: nalgebra_sparse::SparseFormatError) -> Self {
        AssemblyError::InvalidCsr(err.to_string())
    }
}

impl AssemblyError {
    pub(crate) fn verification(message: impl Into<String>) -> Self {
        AssemblyError::Verification(message.into())
    }
}
