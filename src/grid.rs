//! Grid storage and geometry queries.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// State of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    Vacant,
    TypeA,
    TypeB,
}

impl Cell {
    pub fn is_vacant(self) -> bool {
        self == Cell::Vacant
    }

    fn symbol(self) -> char {
        match self {
            Cell::Vacant => '.',
            Cell::TypeA => 'A',
            Cell::TypeB => 'B',
        }
    }

    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '.' => Some(Cell::Vacant),
            'A' => Some(Cell::TypeA),
            'B' => Some(Cell::TypeB),
            _ => None,
        }
    }
}

/// Zero-indexed `(row, col)` position on a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Shape of the neighborhood around a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// The 8 orthogonal and diagonal neighbors.
    #[default]
    Moore,
    /// The 4 orthogonal neighbors.
    VonNeumann,
}

// Up-left, up, up-right, left, down-left, down, down-right, right.
const MOORE_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
];

// Up, left, down, right.
const VON_NEUMANN_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, -1), (1, 0), (0, 1)];

impl Neighborhood {
    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Neighborhood::Moore => &MOORE_OFFSETS,
            Neighborhood::VonNeumann => &VON_NEUMANN_OFFSETS,
        }
    }
}

/// Fixed-size 2-D array of cells stored in row-major order.
///
/// The dimensions are set at construction and never change, so the total
/// number of cells is invariant for the lifetime of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct Grid {
    n_rows: usize,
    n_cols: usize,
    cells: Vec<Cell>,
}

/// Unchecked grid fields, as read from a file.
#[derive(Deserialize)]
struct RawGrid {
    n_rows: usize,
    n_cols: usize,
    cells: Vec<Cell>,
}

impl TryFrom<RawGrid> for Grid {
    type Error = SimError;

    fn try_from(raw: RawGrid) -> SimResult<Self> {
        let n_cells = checked_n_cells(raw.n_rows, raw.n_cols)?;
        if raw.cells.len() != n_cells {
            return Err(SimError::CellCount {
                expected: n_cells,
                found: raw.cells.len(),
            });
        }
        Ok(Self {
            n_rows: raw.n_rows,
            n_cols: raw.n_cols,
            cells: raw.cells,
        })
    }
}

fn checked_n_cells(n_rows: usize, n_cols: usize) -> SimResult<usize> {
    match n_rows.checked_mul(n_cols) {
        Some(n_cells) if n_cells > 0 => Ok(n_cells),
        _ => Err(SimError::InvalidDimensions { n_rows, n_cols }),
    }
}

impl Grid {
    /// Create a grid with every cell vacant.
    ///
    /// # Errors
    /// Returns [`SimError::InvalidDimensions`] if either dimension is zero
    /// or the cell count overflows.
    pub fn new(n_rows: usize, n_cols: usize) -> SimResult<Self> {
        let n_cells = checked_n_cells(n_rows, n_cols)?;
        Ok(Self {
            n_rows,
            n_cols,
            cells: vec![Cell::Vacant; n_cells],
        })
    }

    /// Create a grid from a list of rows.
    ///
    /// # Errors
    /// Returns [`SimError::InvalidDimensions`] if there are no rows, the first
    /// row is empty, or the rows have different lengths.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> SimResult<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if n_rows == 0 || n_cols == 0 || rows.iter().any(|row| row.len() != n_cols) {
            return Err(SimError::InvalidDimensions { n_rows, n_cols });
        }
        let cells = rows.into_iter().flatten().collect();
        Ok(Self {
            n_rows,
            n_cols,
            cells,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Check whether `(row, col)` lies inside the grid.
    ///
    /// Takes signed coordinates so that off-grid neighbor candidates can be tested.
    pub fn is_valid_location(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.n_rows && (col as usize) < self.n_cols
    }

    fn index(&self, loc: Location) -> SimResult<usize> {
        if loc.row >= self.n_rows || loc.col >= self.n_cols {
            return Err(self.invalid_location(loc.row as isize, loc.col as isize));
        }
        Ok(loc.row * self.n_cols + loc.col)
    }

    fn invalid_location(&self, row: isize, col: isize) -> SimError {
        SimError::InvalidLocation {
            row,
            col,
            n_rows: self.n_rows,
            n_cols: self.n_cols,
        }
    }

    /// Get the state of the cell at `loc`.
    pub fn get(&self, loc: Location) -> SimResult<Cell> {
        let idx = self.index(loc)?;
        Ok(self.cells[idx])
    }

    /// Set the state of the cell at `loc`.
    pub fn set(&mut self, loc: Location, cell: Cell) -> SimResult<()> {
        let idx = self.index(loc)?;
        self.cells[idx] = cell;
        Ok(())
    }

    /// List the in-bounds neighbors of `loc` in a fixed order.
    ///
    /// Corner and edge cells simply have fewer neighbors.
    pub fn neighbors_of(&self, loc: Location, shape: Neighborhood) -> SimResult<Vec<Location>> {
        self.index(loc)?;
        Ok(self.neighbor_iter(loc, shape).collect())
    }

    // `loc` must be in bounds.
    fn neighbor_iter(
        &self,
        loc: Location,
        shape: Neighborhood,
    ) -> impl Iterator<Item = Location> + '_ {
        let (row, col) = (loc.row as isize, loc.col as isize);
        shape
            .offsets()
            .iter()
            .map(move |&(d_row, d_col)| (row + d_row, col + d_col))
            .filter(move |&(n_row, n_col)| self.is_valid_location(n_row, n_col))
            .map(|(n_row, n_col)| Location::new(n_row as usize, n_col as usize))
    }

    /// Count the occupied neighbors of `loc`, and how many of them share its state.
    ///
    /// Returns `(n_same, n_occupied)`.
    pub fn neighbor_counts(
        &self,
        loc: Location,
        shape: Neighborhood,
    ) -> SimResult<(usize, usize)> {
        let cell = self.get(loc)?;
        let (mut n_same, mut n_occupied) = (0, 0);
        for neighbor in self.neighbor_iter(loc, shape) {
            let other = self.cells[neighbor.row * self.n_cols + neighbor.col];
            if other.is_vacant() {
                continue;
            }
            n_occupied += 1;
            if other == cell {
                n_same += 1;
            }
        }
        Ok((n_same, n_occupied))
    }

    /// Iterate over all cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Location, Cell)> + '_ {
        let n_cols = self.n_cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, &cell)| (Location::new(idx / n_cols, idx % n_cols), cell))
    }

    /// Count the cells in the given state.
    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|&&other| other == cell).count()
    }

    /// List the locations of the cells in the given state, in row-major order.
    pub fn locations_of(&self, cell: Cell) -> Vec<Location> {
        self.iter()
            .filter(|&(_, other)| other == cell)
            .map(|(loc, _)| loc)
            .collect()
    }

    /// Mean share of like neighbors among the occupied neighbors of each agent.
    ///
    /// Agents without occupied neighbors are skipped. Returns `NaN` if no agent
    /// has an occupied neighbor.
    pub fn same_type_fraction(&self, shape: Neighborhood) -> f64 {
        let mut frac_sum = 0.0;
        let mut n_agents = 0;
        for (loc, _) in self.iter().filter(|(_, cell)| !cell.is_vacant()) {
            let Ok((n_same, n_occupied)) = self.neighbor_counts(loc, shape) else {
                continue;
            };
            if n_occupied > 0 {
                frac_sum += n_same as f64 / n_occupied as f64;
                n_agents += 1;
            }
        }
        if n_agents == 0 {
            return f64::NAN;
        }
        frac_sum / n_agents as f64
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.n_cols) {
            let line: String = row.iter().map(|cell| cell.symbol()).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl FromStr for Grid {
    type Err = SimError;

    /// Parse one row per line using `.`, `A` and `B`; blank lines are ignored.
    fn from_str(text: &str) -> SimResult<Self> {
        let mut rows = Vec::new();
        for (i_line, line) in text.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
            let row = line
                .chars()
                .map(|symbol| {
                    Cell::from_symbol(symbol).ok_or_else(|| {
                        SimError::Parse(format!("unknown symbol {symbol:?} in row {i_line}"))
                    })
                })
                .collect::<SimResult<Vec<_>>>()?;
            rows.push(row);
        }
        Self::from_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(text: &str) -> Grid {
        text.parse().expect("failed to parse grid")
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert_eq!(
            Grid::new(0, 3),
            Err(SimError::InvalidDimensions {
                n_rows: 0,
                n_cols: 3
            })
        );
        assert!(Grid::from_rows(vec![vec![Cell::TypeA], vec![]]).is_err());
        assert!("".parse::<Grid>().is_err());
    }

    #[test]
    fn valid_locations() {
        let grid = Grid::new(3, 4).unwrap();
        assert!(grid.is_valid_location(0, 0));
        assert!(grid.is_valid_location(2, 3));
        assert!(!grid.is_valid_location(-1, 0));
        assert!(!grid.is_valid_location(0, -1));
        assert!(!grid.is_valid_location(3, 0));
        assert!(!grid.is_valid_location(0, 4));
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut grid = Grid::new(2, 2).unwrap();
        let err = SimError::InvalidLocation {
            row: 2,
            col: 0,
            n_rows: 2,
            n_cols: 2,
        };
        assert_eq!(grid.get(Location::new(2, 0)), Err(err.clone()));
        assert_eq!(grid.set(Location::new(2, 0), Cell::TypeA), Err(err));
        assert_eq!(grid.count(Cell::Vacant), 4);
    }

    #[test]
    fn moore_neighbor_counts_and_order() {
        let grid = Grid::new(3, 3).unwrap();
        let count = |row, col| {
            grid.neighbors_of(Location::new(row, col), Neighborhood::Moore)
                .unwrap()
                .len()
        };
        assert_eq!(count(0, 0), 3);
        assert_eq!(count(0, 1), 5);
        assert_eq!(count(1, 1), 8);

        let center = grid
            .neighbors_of(Location::new(1, 1), Neighborhood::Moore)
            .unwrap();
        let expected: Vec<_> = [(0, 0), (0, 1), (0, 2), (1, 0), (2, 0), (2, 1), (2, 2), (1, 2)]
            .into_iter()
            .map(|(row, col)| Location::new(row, col))
            .collect();
        assert_eq!(center, expected);
    }

    #[test]
    fn von_neumann_neighbors() {
        let grid = Grid::new(3, 3).unwrap();
        let corner = grid
            .neighbors_of(Location::new(0, 0), Neighborhood::VonNeumann)
            .unwrap();
        assert_eq!(corner, vec![Location::new(1, 0), Location::new(0, 1)]);
        let center = grid
            .neighbors_of(Location::new(1, 1), Neighborhood::VonNeumann)
            .unwrap();
        assert_eq!(center.len(), 4);
    }

    #[test]
    fn neighbors_of_invalid_location_fails() {
        let grid = Grid::new(2, 2).unwrap();
        assert!(
            grid.neighbors_of(Location::new(0, 5), Neighborhood::Moore)
                .is_err()
        );
    }

    #[test]
    fn text_form() {
        let text = "AAB\nA.B\nBBA\n";
        let grid = grid(text);
        assert_eq!(grid.n_rows(), 3);
        assert_eq!(grid.n_cols(), 3);
        assert_eq!(grid.get(Location::new(1, 1)), Ok(Cell::Vacant));
        assert_eq!(grid.get(Location::new(2, 2)), Ok(Cell::TypeA));
        assert_eq!(grid.to_string(), text);
        assert!(matches!("AXB".parse::<Grid>(), Err(SimError::Parse(_))));
    }

    #[test]
    fn counts_and_locations() {
        let grid = grid("AAB\nA.B\nBBA");
        assert_eq!(grid.count(Cell::TypeA), 4);
        assert_eq!(grid.count(Cell::TypeB), 4);
        assert_eq!(grid.locations_of(Cell::Vacant), vec![Location::new(1, 1)]);
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        assert_eq!(
            Grid::new(usize::MAX, 2),
            Err(SimError::InvalidDimensions {
                n_rows: usize::MAX,
                n_cols: 2
            })
        );
    }

    #[derive(Serialize)]
    struct UncheckedGrid {
        n_rows: usize,
        n_cols: usize,
        cells: Vec<Cell>,
    }

    #[test]
    fn decoding_checks_dimensions() {
        let decode = |n_rows, n_cols, cells: Vec<Cell>| {
            let bytes = rmp_serde::to_vec(&UncheckedGrid {
                n_rows,
                n_cols,
                cells,
            })
            .unwrap();
            rmp_serde::from_slice::<Grid>(&bytes)
        };

        let cells = vec![Cell::TypeA, Cell::Vacant, Cell::TypeB, Cell::TypeA];
        let grid = decode(2, 2, cells).unwrap();
        assert_eq!(grid.to_string(), "A.\nBA\n");

        assert!(decode(3, 3, vec![Cell::TypeA; 2]).is_err());
        assert!(decode(3, 0, Vec::new()).is_err());
        assert!(decode(usize::MAX, 2, Vec::new()).is_err());
    }

    #[test]
    fn neighbor_counts() {
        let grid = grid("AAB\nA.B\nBBA");
        assert_eq!(
            grid.neighbor_counts(Location::new(0, 1), Neighborhood::Moore),
            Ok((2, 4))
        );
        assert_eq!(
            grid.neighbor_counts(Location::new(2, 2), Neighborhood::Moore),
            Ok((0, 2))
        );
        assert_eq!(
            grid.neighbor_counts(Location::new(0, 0), Neighborhood::VonNeumann),
            Ok((2, 2))
        );
        assert!(
            grid.neighbor_counts(Location::new(3, 0), Neighborhood::Moore)
                .is_err()
        );
    }

    #[test]
    fn same_type_fraction() {
        assert_eq!(grid("AA\nAA").same_type_fraction(Neighborhood::Moore), 1.0);
        assert_eq!(grid("AB").same_type_fraction(Neighborhood::Moore), 0.0);
        assert!(grid("A.B").same_type_fraction(Neighborhood::Moore).is_nan());
    }
}
