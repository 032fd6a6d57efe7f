// THEORY:
// `Grid<T>` is the "dumb" data container every raster in the engine is built
// on: radiance bands, validity masks, index rasters, threshold fields and
// severity labels. It is a flat, row-major `Vec<T>` plus its dimensions and
// knows nothing about what its cells mean.
//
// Keeping a single container type gives us one place for index math and one
// place for the shape check that every derived raster must pass: all rasters
// derived from a frame share its width and height.

use crate::error::{NhiError, Result};
use serde::{Deserialize, Serialize};

/// A grid coordinate. `x` is the column, `y` the row, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Offsets of the 4 edge-sharing neighbours.
pub const EDGE_NEIGHBOURS: [(isize, isize); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Offsets of all 8 surrounding neighbours.
pub const ALL_NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A row-major 2D grid of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Creates a grid with every cell set to `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width * height],
        }
    }
}

impl<T> Grid<T> {
    /// Wraps existing row-major data. Fails if `cells.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, cells: Vec<T>) -> Result<Self> {
        if cells.len() != width * height {
            return Err(NhiError::GridSize {
                expected: width * height,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Builds a grid by evaluating `f` at every cell in row-major order.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(Cell) -> T) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(Cell { x, y }));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Dimensions as `(width, height)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.shape() == other.shape()
    }

    #[inline]
    pub fn index_of(&self, cell: Cell) -> usize {
        cell.y * self.width + cell.x
    }

    #[inline]
    pub fn cell_at(&self, index: usize) -> Cell {
        Cell {
            x: index % self.width,
            y: index / self.width,
        }
    }

    pub fn get(&self, cell: Cell) -> Option<&T> {
        if cell.x < self.width && cell.y < self.height {
            self.cells.get(self.index_of(cell))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, cell: Cell) -> Option<&mut T> {
        if cell.x < self.width && cell.y < self.height {
            let index = self.index_of(cell);
            self.cells.get_mut(index)
        } else {
            None
        }
    }

    /// Direct access by flat index. Panics when out of range.
    #[inline]
    pub fn at(&self, index: usize) -> &T {
        &self.cells[index]
    }

    /// Overwrites the cell at flat `index`. Panics when out of range.
    #[inline]
    pub fn set_at(&mut self, index: usize, value: T) {
        self.cells[index] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }

    /// The neighbour of `cell` at offset `(dx, dy)`, if it lies inside the grid.
    pub fn offset(&self, cell: Cell, dx: isize, dy: isize) -> Option<Cell> {
        let nx = cell.x as isize + dx;
        let ny = cell.y as isize + dy;
        if nx >= 0 && ny >= 0 && (nx as usize) < self.width && (ny as usize) < self.height {
            Some(Cell {
                x: nx as usize,
                y: ny as usize,
            })
        } else {
            None
        }
    }

    /// Applies `f` to every cell, keeping the shape.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            cells: self.cells.iter().map(f).collect(),
        }
    }
}
