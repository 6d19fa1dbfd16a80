use std::{num::NonZeroUsize, thread};

use crate::proc::Rect;

/// How the board is split among workers.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum Strategy {
    /// Contiguous row ranges, one per worker.
    #[default]
    RowStripes,
    /// One worker per cell.
    PerCell,
}

/// The cells one worker owns for the whole run: rows `[start_row, end_row)`
/// crossed with cols `[start_col, end_col)`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct WorkUnit {
    pub worker: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl WorkUnit {
    #[inline]
    pub fn len(&self) -> usize {
        (self.end_row - self.start_row) * (self.end_col - self.start_col)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let (cols_from, cols_to) = (self.start_col, self.end_col);
        (self.start_row..self.end_row).flat_map(move |i| (cols_from..cols_to).map(move |j| (i, j)))
    }
}

#[derive(Debug, Clone)]
pub struct PartitionPlan {
    size: Rect,
    units: Vec<WorkUnit>,
}

impl PartitionPlan {
    pub fn new(size: Rect, strategy: Strategy, workers: usize) -> Self {
        match strategy {
            Strategy::RowStripes => Self::row_stripes(size, workers),
            Strategy::PerCell => Self::per_cell(size),
        }
    }

    /// Splits rows as evenly as possible: the first `rows % workers` stripes
    /// get one extra row. `workers` is clamped into `[1, rows]`.
    pub fn row_stripes(size: Rect, workers: usize) -> Self {
        let workers = workers.clamp(1, size.rows().max(1));
        let base = size.rows() / workers;
        let extra = size.rows() % workers;

        let mut start = 0;
        let units = (0..workers)
            .map(|worker| {
                let end = start + base + usize::from(worker < extra);
                let unit = WorkUnit {
                    worker,
                    start_row: start,
                    end_row: end,
                    start_col: 0,
                    end_col: size.cols(),
                };
                start = end;
                unit
            })
            .collect();

        PartitionPlan { size, units }
    }

    pub fn per_cell(size: Rect) -> Self {
        let units = (0..size.rows())
            .flat_map(|i| (0..size.cols()).map(move |j| (i, j)))
            .enumerate()
            .map(|(worker, (i, j))| WorkUnit {
                worker,
                start_row: i,
                end_row: i + 1,
                start_col: j,
                end_col: j + 1,
            })
            .collect();

        PartitionPlan { size, units }
    }

    #[inline]
    pub fn size(&self) -> &Rect {
        &self.size
    }

    #[inline]
    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.units.len()
    }
}

/// Hardware parallelism, 1 when it cannot be determined.
pub fn available_workers() -> usize {
    thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}
