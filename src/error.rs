//! Error conditions of the grid and the simulation engine.

use thiserror::Error;

/// Errors raised by [`Grid`](crate::grid::Grid) and [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("location ({row}, {col}) is outside the {n_rows}x{n_cols} grid")]
    InvalidLocation {
        row: isize,
        col: isize,
        n_rows: usize,
        n_cols: usize,
    },

    #[error("no vacant location available")]
    NoVacancyAvailable,

    #[error("grid dimensions must be at least 1x1, but are {n_rows}x{n_cols}")]
    InvalidDimensions { n_rows: usize, n_cols: usize },

    #[error("grid must have {expected} cells, but has {found}")]
    CellCount { expected: usize, found: usize },

    #[error("invalid grid text: {0}")]
    Parse(String),
}

/// Shorthand result type for grid and engine operations.
pub type SimResult<T> = Result<T, SimError>;
