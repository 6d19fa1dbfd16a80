use std::time::Duration;

use crate::{
    error::{Error, Result},
    partition::{self, Strategy},
    proc::Rect,
};

/// The barrier's stop sentinel is `generations + 1`, so it must fit.
pub const MAX_GENERATIONS: u64 = u64::MAX - 1;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub size: Rect,
    pub generations: u64,
    /// Explicit row-stripe worker count; hardware parallelism when unset.
    pub workers: Option<usize>,
    pub strategy: Strategy,
    /// Delay after each emitted generation.
    pub pace: Duration,
}

impl SimConfig {
    pub fn new(rows: usize, cols: usize, generations: u64) -> Result<Self> {
        let config = SimConfig {
            size: Rect::new(rows, cols),
            generations,
            workers: None,
            strategy: Strategy::default(),
            pace: Duration::ZERO,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks fields that may have been set directly.
    pub fn validate(&self) -> Result<()> {
        let (rows, cols) = (self.size.rows(), self.size.cols());
        if rows == 0 || cols == 0 {
            return Err(Error::Config(format!("grid must be at least 1x1, got {rows}x{cols}")));
        }
        if self.generations > MAX_GENERATIONS {
            return Err(Error::Config(format!("at most {MAX_GENERATIONS} generations")));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("worker count must be positive".into()));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("worker count must be positive".into()));
        }
        self.workers = Some(workers);
        Ok(self)
    }

    #[inline]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Number of worker threads the run will start.
    pub fn worker_count(&self) -> usize {
        match self.strategy {
            Strategy::RowStripes => self
                .workers
                .unwrap_or_else(partition::available_workers)
                .clamp(1, self.size.rows()),
            Strategy::PerCell => self.size.area(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_grid() {
        assert!(matches!(SimConfig::new(0, 4, 1), Err(Error::Config(_))));
        assert!(matches!(SimConfig::new(4, 0, 1), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_generation_count_without_room_for_shutdown() {
        assert!(matches!(SimConfig::new(2, 2, u64::MAX), Err(Error::Config(_))));
        assert!(SimConfig::new(2, 2, MAX_GENERATIONS).is_ok());

        let mut cfg = SimConfig::new(2, 2, 1).unwrap();
        cfg.generations = u64::MAX;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_workers() {
        let cfg = SimConfig::new(4, 4, 1).unwrap();
        assert!(matches!(cfg.with_workers(0), Err(Error::Config(_))));
    }

    #[test]
    fn worker_count_is_clamped_to_rows() {
        let cfg = SimConfig::new(3, 10, 1).unwrap().with_workers(32).unwrap();
        assert_eq!(cfg.worker_count(), 3);

        let cfg = SimConfig::new(3, 10, 1).unwrap();
        assert!((1..=3).contains(&cfg.worker_count()));
    }

    #[test]
    fn per_cell_ignores_workers() {
        let cfg = SimConfig::new(3, 4, 1)
            .unwrap()
            .with_workers(2)
            .unwrap()
            .with_strategy(Strategy::PerCell);
        assert_eq!(cfg.worker_count(), 12);
    }
}
