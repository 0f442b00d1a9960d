//! The sensor grid: a row-major matrix of [Reading]s, plus the mask of nodes
//! that have no physical sensor behind them.

use std::fmt;

/// A grid coordinate, `(row, col)`.
pub type Coord = (usize, usize);

/// One node's value for one cycle.
///
/// "Nothing measured here" is its own variant instead of a magic float, so a
/// missing sensor can never be mistaken for a very light step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A measured (or derived) value, ohms before rescaling
    Sensed(f32),
    /// No sensor at this node
    NoData,
}

impl Reading {
    /// The measured value, if there is one.
    pub fn value(self) -> Option<f32> {
        match self {
            Reading::Sensed(v) => Some(v),
            Reading::NoData => None,
        }
    }

    /// Flattens the reading into a float, using `marker` for [Reading::NoData].
    pub fn value_or(self, marker: f32) -> f32 {
        self.value().unwrap_or(marker)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Sensed(v) => write!(f, "{:.1}", v),
            Reading::NoData => write!(f, "--"),
        }
    }
}

/// A `rows × cols` matrix of [Reading]s stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Reading>,
}

impl Grid {
    /// A grid with every node set to `fill`.
    pub fn filled(rows: usize, cols: usize, fill: Reading) -> Self {
        Self {
            rows,
            cols,
            cells: vec![fill; rows * cols],
        }
    }

    /// Builds a grid out of row-major cells. Returns `None` if the number of
    /// cells does not match the shape.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<Reading>) -> Option<Self> {
        (cells.len() == rows * cols).then_some(Self { rows, cols, cells })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Reads a node. Panics if the coordinate is outside the grid, like
    /// slice indexing does.
    pub fn get(&self, row: usize, col: usize) -> Reading {
        self.cells[self.index(row, col)]
    }

    /// Overwrites a node.
    pub fn set(&mut self, row: usize, col: usize, reading: Reading) {
        let i = self.index(row, col);
        self.cells[i] = reading;
    }

    /// All nodes, row-major.
    pub fn cells(&self) -> &[Reading] {
        &self.cells
    }

    /// All nodes, row-major, mutably.
    pub fn cells_mut(&mut self) -> &mut [Reading] {
        &mut self.cells
    }

    /// One row of the grid.
    pub fn row(&self, row: usize) -> &[Reading] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterates over the rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[Reading]> {
        self.cells.chunks(self.cols.max(1))
    }

    /// A copy of the grid as nested float rows, with `marker` standing in for
    /// [Reading::NoData].
    pub fn to_marker_rows(&self, marker: f32) -> Vec<Vec<f32>> {
        self.iter_rows()
            .map(|row| row.iter().map(|r| r.value_or(marker)).collect())
            .collect()
    }

    fn index(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.rows && col < self.cols,
            "({row}, {col}) is outside a {}x{} grid",
            self.rows,
            self.cols
        );
        row * self.cols + col
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.iter_rows() {
            let line: Vec<String> = row.iter().map(|r| format!("{:>7}", r.to_string())).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// The set of nodes that are physically absent from the insole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMask {
    rows: usize,
    cols: usize,
    omitted: Vec<bool>,
}

impl NodeMask {
    /// Builds the mask. Coordinates outside the grid are ignored here, the
    /// protocol config is where they get rejected.
    pub fn new(rows: usize, cols: usize, omitted: &[Coord]) -> Self {
        let mut mask = vec![false; rows * cols];
        for &(r, c) in omitted {
            if r < rows && c < cols {
                mask[r * cols + c] = true;
            }
        }
        Self {
            rows,
            cols,
            omitted: mask,
        }
    }

    /// Is `(row, col)` missing its sensor?
    pub fn is_omitted(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.omitted[row * self.cols + col]
    }

    /// Same as [NodeMask::is_omitted], by row-major index.
    pub fn is_omitted_index(&self, index: usize) -> bool {
        self.omitted.get(index).copied().unwrap_or(false)
    }

    /// The omitted coordinates, row-major.
    pub fn omitted(&self) -> impl Iterator<Item = Coord> + '_ {
        let cols = self.cols;
        self.omitted
            .iter()
            .enumerate()
            .filter(|(_, o)| **o)
            .map(move |(i, _)| (i / cols, i % cols))
    }

    /// How many nodes actually carry a sensor.
    pub fn active_count(&self) -> usize {
        self.omitted.iter().filter(|&&o| !o).count()
    }

    /// Overwrites every omitted node in `grid` with [Reading::NoData].
    pub fn apply(&self, grid: &mut Grid) {
        for (cell, &omitted) in grid.cells_mut().iter_mut().zip(&self.omitted) {
            if omitted {
                *cell = Reading::NoData;
            }
        }
    }
}
