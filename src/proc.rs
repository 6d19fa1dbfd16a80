use std::{
    io::{BufRead, BufReader, Read},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crate::error::{Error, Result};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Hash)]
pub enum Cell {
    Alive,
    #[default]
    Dead,
}

impl Cell {
    #[inline]
    pub fn is_alive(self) -> bool {
        self == Cell::Alive
    }

    /// Standard B3/S23 rule.
    #[inline]
    pub fn evolve(self, neighbors: u8) -> Cell {
        match (self, neighbors) {
            (Cell::Alive, 2) | (Cell::Alive, 3) => Cell::Alive,
            (Cell::Dead, 3) => Cell::Alive,
            _ => Cell::Dead,
        }
    }
}

impl From<bool> for Cell {
    #[inline]
    fn from(alive: bool) -> Self {
        if alive {
            Cell::Alive
        } else {
            Cell::Dead
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct Rect {
    w: usize, // cols
    h: usize, // rows
}

impl Rect {
    #[inline]
    pub fn new(rows: usize, cols: usize) -> Self {
        Rect { w: cols, h: rows }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.h
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.w
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.w * self.h
    }

    /// Row-major offset of `(row, col)`.
    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.h && col < self.w, "({row}, {col}) outside {self:?}");
        row * self.w + col
    }

    /// Bounded neighborhood of `(row, col)`, the cell itself included.
    #[inline]
    fn around(&self, row: usize, col: usize) -> (std::ops::RangeInclusive<usize>, std::ops::RangeInclusive<usize>) {
        (
            row.saturating_sub(1)..=(row + 1).min(self.h - 1),
            col.saturating_sub(1)..=(col + 1).min(self.w - 1),
        )
    }
}

/// An owned, immutable-shape snapshot of the board.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Grid {
    size: Rect,
    cells: Vec<Cell>,
}

impl Grid {
    #[inline]
    pub fn new(size: Rect) -> Self {
        Grid {
            size,
            cells: vec![Cell::Dead; size.area()],
        }
    }

    /// Builds a grid from rows of text, `'1'` meaning alive.
    ///
    /// Panics if the rows are ragged; meant for literals, use
    /// [`Grid::read_from`] for untrusted input.
    pub fn from_rows(rows: &[&str]) -> Self {
        let cols = rows.first().map_or(0, |r| r.len());
        if !rows.iter().all(|r| r.len() == cols) {
            panic!("All rows of the matrix should be same size!");
        }

        let mut grid = Grid::new(Rect::new(rows.len(), cols));
        for (i, r) in rows.iter().enumerate() {
            for (j, b) in r.bytes().enumerate() {
                grid.set(i, j, Cell::from(b == b'1'));
            }
        }
        grid
    }

    /// Reads exactly `size.area()` cells, row by row.
    ///
    /// Each row is `cols` bytes where `'1'` is alive and anything else is
    /// dead; a trailing `\n` or `\r\n` after a row is skipped if present.
    pub fn read_from<R: Read>(reader: R, size: Rect) -> Result<Self> {
        let mut input = BufReader::new(reader);
        let mut grid = Grid::new(size);
        let mut found = 0;

        for i in 0..size.rows() {
            for j in 0..size.cols() {
                match next_byte(&mut input)? {
                    Some(b) => grid.set(i, j, Cell::from(b == b'1')),
                    None => {
                        return Err(Error::MalformedInput {
                            expected: size.area(),
                            found,
                        })
                    }
                }
                found += 1;
            }
            skip_line_end(&mut input)?;
        }

        Ok(grid)
    }

    #[inline]
    pub fn size(&self) -> &Rect {
        &self.size
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[self.size.offset(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        let at = self.size.offset(row, col);
        self.cells[at] = cell;
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.size.cols().max(1))
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_alive()).count()
    }

    /// `None` outside the grid.
    #[inline]
    fn checked(&self, i: isize, j: isize) -> Option<Cell> {
        if i < 0 || j < 0 || i >= self.size.rows() as isize || j >= self.size.cols() as isize {
            None
        } else {
            Some(self.get(i as usize, j as usize))
        }
    }

    /// Counts over the 8 offsets directly, without the range clipping
    /// `GridState` uses, so the two can check each other.
    pub fn neighbor_count(&self, row: usize, col: usize) -> u8 {
        const OFFSETS: [(isize, isize); 8] = [
            (-1, -1), (-1, 0), (-1, 1),
            (0, -1), (0, 1),
            (1, -1), (1, 0), (1, 1),
        ];
        let (i, j) = (row as isize, col as isize);
        OFFSETS
            .iter()
            .filter(|(di, dj)| self.checked(i + di, j + dj).is_some_and(Cell::is_alive))
            .count() as u8
    }

    /// Single-threaded step with bounded edges.
    pub fn tick(&mut self) {
        let mut next = Grid::new(self.size);
        for i in 0..self.size.rows() {
            for j in 0..self.size.cols() {
                next.set(i, j, self.get(i, j).evolve(self.neighbor_count(i, j)));
            }
        }
        *self = next;
    }
}

fn next_byte<R: BufRead>(input: &mut R) -> Result<Option<u8>> {
    let b = input.fill_buf()?.first().copied();
    if b.is_some() {
        input.consume(1);
    }
    Ok(b)
}

fn skip_line_end<R: BufRead>(input: &mut R) -> Result<()> {
    match input.fill_buf()?.first().copied() {
        Some(b'\n') => input.consume(1),
        Some(b'\r') => {
            input.consume(1);
            if input.fill_buf()?.first().copied() == Some(b'\n') {
                input.consume(1);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Double-buffered board shared by every worker of a run.
///
/// Both buffers live for the whole run; `swap` flips which one is current.
/// Cells are atomics so that concurrent readers of the current buffer and
/// disjoint writers of the next buffer need no lock. Visibility across a
/// generation boundary comes from the barrier mutex, so all accesses here
/// are `Relaxed`.
pub struct GridState {
    size: Rect,
    buffers: [Box<[AtomicBool]>; 2],
    current: AtomicUsize,
}

impl GridState {
    pub fn new(initial: &Grid) -> Self {
        let load = || -> Box<[AtomicBool]> {
            initial.cells.iter().map(|c| AtomicBool::new(c.is_alive())).collect()
        };
        let blank = || -> Box<[AtomicBool]> {
            (0..initial.size.area()).map(|_| AtomicBool::new(false)).collect()
        };

        GridState {
            size: initial.size,
            buffers: [load(), blank()],
            current: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn size(&self) -> &Rect {
        &self.size
    }

    #[inline]
    fn current(&self) -> &[AtomicBool] {
        &self.buffers[self.current.load(Ordering::Relaxed)]
    }

    #[inline]
    fn next(&self) -> &[AtomicBool] {
        &self.buffers[self.current.load(Ordering::Relaxed) ^ 1]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.current()[self.size.offset(row, col)].load(Ordering::Relaxed).into()
    }

    /// Live cells among the up to 8 in-bounds neighbors, read from current.
    pub fn neighbor_count(&self, row: usize, col: usize) -> u8 {
        let current = self.current();
        let (rs, cs) = self.size.around(row, col);
        let mut n = 0;
        for i in rs {
            for j in cs.clone() {
                if (i, j) != (row, col) && current[self.size.offset(i, j)].load(Ordering::Relaxed) {
                    n += 1;
                }
            }
        }
        n
    }

    #[inline]
    pub fn next_state(&self, row: usize, col: usize) -> Cell {
        self.get(row, col).evolve(self.neighbor_count(row, col))
    }

    /// Writes into the next buffer. Each cell must have a single writer per
    /// generation.
    #[inline]
    pub fn store_next(&self, row: usize, col: usize, cell: Cell) {
        self.next()[self.size.offset(row, col)].store(cell.is_alive(), Ordering::Relaxed);
    }

    /// Makes next the current buffer. Only the coordinator calls this, and
    /// only between `await_all` and the following `publish`.
    #[inline]
    pub fn swap(&self) {
        self.current.fetch_xor(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Grid {
        Grid {
            size: self.size,
            cells: self.current().iter().map(|c| c.load(Ordering::Relaxed).into()).collect(),
        }
    }
}
