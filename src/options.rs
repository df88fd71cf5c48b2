//! Tuning knobs for assembly.
use serde::{Deserialize, Serialize};

/// How the count and fill passes iterate over the global DOFs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Execution {
    Serial,
    /// Rows are distributed over the rayon thread pool.
    Parallel,
}

/// How the distributed elimination locates eliminated columns in off-diagonal rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnElimination {
    /// For each eliminated column, scan every off-diagonal row.
    Scan,
    /// For each off-diagonal row, binary search the sorted set of eliminated columns.
    BinarySearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// The largest number of element slots that may reference a single DOF.
    pub max_incidence_degree: usize,
    pub execution: Execution,
    /// The minimum number of rows handed to one rayon task.
    pub min_parallel_len: usize,
    pub column_elimination: ColumnElimination,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            max_incidence_degree: 16,
            execution: Execution::Parallel,
            min_parallel_len: 64,
            column_elimination: ColumnElimination::Scan,
        }
    }
}

impl AssemblyOptions {
    pub fn with_max_incidence_degree(self, max_incidence_degree: usize) -> Self {
        Self {
            max_incidence_degree,
            ..self
        }
    }

    pub fn with_execution(self, execution: Execution) -> Self {
        Self { execution, ..self }
    }

    pub fn with_min_parallel_len(self, min_parallel_len: usize) -> Self {
        Self {
            min_parallel_len: min_parallel_len.max(1),
            ..self
        }
    }

    pub fn with_column_elimination(self, column_elimination: ColumnElimination) -> Self {
        Self {
            column_elimination,
            ..self
        }
    }

    pub fn serial() -> Self {
        Self::default().with_execution(Execution::Serial)
    }
}
