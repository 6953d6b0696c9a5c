//! Board engine: pure win and draw detection on square boards.
//!
//! Cells are stored row-major, so position `p` is row `p / size`,
//! column `p % size`. Every function panics if the slice length is not
//! `size * size`: a malformed board is a bug in the caller, not bad input.

use gridlock_protocol::{BoardSize, Symbol};

/// One board cell.
pub type Cell = Option<Symbol>;

/// All candidate lines for a board, in scan order: rows top to bottom,
/// columns left to right, the main diagonal, then the anti-diagonal.
pub fn lines(size: BoardSize) -> Vec<Vec<usize>> {
    let n = size.get();
    let mut lines = Vec::with_capacity(2 * n + 2);
    for row in 0..n {
        lines.push((0..n).map(|col| row * n + col).collect());
    }
    for col in 0..n {
        lines.push((0..n).map(|row| row * n + col).collect());
    }
    lines.push((0..n).map(|i| i * n + i).collect());
    lines.push((0..n).map(|i| i * n + (n - 1 - i)).collect());
    lines
}

fn assert_shape(cells: &[Cell], size: BoardSize) {
    assert_eq!(
        cells.len(),
        size.cells(),
        "board of size {size} must have {} cells",
        size.cells()
    );
}

/// The first line in scan order whose cells all hold the same symbol.
///
/// When a single move completes several lines, only the first one in scan
/// order is reported.
pub fn winning_line(cells: &[Cell], size: BoardSize) -> Option<(Symbol, Vec<usize>)> {
    assert_shape(cells, size);
    lines(size).into_iter().find_map(|line| {
        let first = cells[line[0]]?;
        line.iter()
            .all(|&i| cells[i] == Some(first))
            .then_some((first, line))
    })
}

/// The winning symbol, if any line is complete.
pub fn check_winner(cells: &[Cell], size: BoardSize) -> Option<Symbol> {
    winning_line(cells, size).map(|(symbol, _)| symbol)
}

/// `true` once no empty cell remains.
pub fn is_full(cells: &[Cell], size: BoardSize) -> bool {
    assert_shape(cells, size);
    cells.iter().all(Option::is_some)
}

/// A square board of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: BoardSize,
    cells: Vec<Cell>,
}

impl Board {
    /// A freshly allocated empty board.
    pub fn new(size: BoardSize) -> Self {
        Self {
            size,
            cells: vec![None; size.cells()],
        }
    }

    /// Rebuilds a board from stored cells, or `None` if the shape is wrong.
    pub fn from_cells(size: BoardSize, cells: Vec<Cell>) -> Option<Self> {
        (cells.len() == size.cells()).then_some(Self { size, cells })
    }

    pub fn size(&self) -> BoardSize {
        self.size
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The cell at `position`, or `None` when out of bounds.
    pub fn get(&self, position: usize) -> Option<Cell> {
        self.cells.get(position).copied()
    }

    /// Writes `symbol` into an empty in-bounds cell.
    ///
    /// Returns `false` without touching the board otherwise.
    pub fn place(&mut self, position: usize, symbol: Symbol) -> bool {
        match self.cells.get_mut(position) {
            Some(cell) if cell.is_none() => {
                *cell = Some(symbol);
                true
            }
            _ => false,
        }
    }

    pub fn winning_line(&self) -> Option<(Symbol, Vec<usize>)> {
        winning_line(&self.cells, self.size)
    }

    pub fn is_full(&self) -> bool {
        is_full(&self.cells, self.size)
    }
}
