use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// Record of the simulation at a single save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Number of steps performed so far.
    pub step: usize,

    /// Agents that were unsatisfied at the start of the last step.
    pub n_unsatisfied: usize,

    /// Cached satisfied percentage after the last step.
    pub satisfied_pct: f64,

    /// Grid snapshot.
    pub grid: Grid,
}
