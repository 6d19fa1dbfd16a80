use std::{sync::Arc, thread};

use crate::{
    config::SimConfig,
    draw::GenerationSink,
    error::{Error, Result},
    partition::PartitionPlan,
    pool::{Context, WorkerPool},
    proc::{Grid, GridState},
};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub generations: u64,
    pub workers: usize,
    /// Generations computed by each worker, by worker id.
    pub computed: Vec<u64>,
    pub last: Grid,
}

/// Owns the generation loop of a single run.
pub struct Driver {
    config: SimConfig,
    ctx: Arc<Context>,
}

impl Driver {
    pub fn new(config: SimConfig, initial: &Grid) -> Result<Self> {
        config.validate()?;
        if initial.size() != &config.size {
            return Err(Error::Config(format!(
                "grid is {}x{}, configuration says {}x{}",
                initial.size().rows(),
                initial.size().cols(),
                config.size.rows(),
                config.size.cols(),
            )));
        }

        let plan = PartitionPlan::new(config.size, config.strategy, config.worker_count());
        tracing::debug!(strategy = ?config.strategy, workers = plan.workers(), "partitioned grid");

        let ctx = Arc::new(Context::new(GridState::new(initial), plan, config.generations));
        Ok(Driver { config, ctx })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.ctx.plan.workers()
    }

    /// Runs every generation, emitting generation 0 first and each computed
    /// generation after it to every sink.
    ///
    /// The pool is always shut down and joined, also when a sink fails
    /// midway; the first error wins.
    pub fn run(self, sinks: &mut [&mut dyn GenerationSink]) -> Result<RunSummary> {
        tracing::info!(
            rows = self.config.size.rows(),
            cols = self.config.size.cols(),
            generations = self.config.generations,
            workers = self.workers(),
            "starting simulation"
        );

        emit(sinks, 0, &self.ctx.grid.snapshot())?;

        let pool = WorkerPool::spawn(&self.ctx)?;
        let looped = self.generations(sinks);

        self.ctx.barrier.shutdown();
        let joined = pool.join();
        let finished = sinks.iter_mut().try_for_each(|s| s.finish());

        looped?;
        let computed = joined?;
        finished?;

        tracing::info!(generations = self.config.generations, "simulation finished");
        Ok(RunSummary {
            generations: self.config.generations,
            workers: computed.len(),
            computed,
            last: self.ctx.grid.snapshot(),
        })
    }

    fn generations(&self, sinks: &mut [&mut dyn GenerationSink]) -> Result<()> {
        let ctx = &self.ctx;
        for generation in 1..=self.config.generations {
            ctx.barrier.publish(generation)?;
            ctx.barrier.await_all()?;
            ctx.grid.swap();

            let grid = ctx.grid.snapshot();
            tracing::debug!(generation, alive = grid.live_count(), "generation done");
            emit(sinks, generation, &grid)?;

            if !self.config.pace.is_zero() {
                thread::sleep(self.config.pace);
            }
        }
        Ok(())
    }
}

fn emit(sinks: &mut [&mut dyn GenerationSink], generation: u64, grid: &Grid) -> Result<()> {
    sinks.iter_mut().try_for_each(|s| s.emit(generation, grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::History;

    struct Failing {
        after: u64,
        finished: bool,
    }

    impl GenerationSink for Failing {
        fn emit(&mut self, generation: u64, _: &Grid) -> Result<()> {
            if generation > self.after {
                return Err(std::io::Error::other("disk full").into());
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    #[test]
    fn emits_every_generation() {
        let cfg = SimConfig::new(3, 3, 4).unwrap().with_workers(2).unwrap();
        let grid = Grid::from_rows(&[".1.", ".1.", ".1."]);
        let mut history = History::new();

        let summary = Driver::new(cfg, &grid).unwrap().run(&mut [&mut history]).unwrap();

        assert_eq!(summary.workers, 2);
        assert_eq!(summary.computed, vec![4, 4]);
        assert_eq!(summary.last, grid);
        assert_eq!(history.frames().len(), 5);
        for (i, (generation, _)) in history.frames().iter().enumerate() {
            assert_eq!(*generation, i as u64);
        }
    }

    #[test]
    fn zero_generations_only_emits_the_initial_grid() {
        let cfg = SimConfig::new(2, 2, 0).unwrap();
        let grid = Grid::from_rows(&["11", "1."]);
        let mut history = History::new();

        let summary = Driver::new(cfg, &grid).unwrap().run(&mut [&mut history]).unwrap();

        assert!(summary.computed.iter().all(|&n| n == 0));
        assert_eq!(history.frames(), &[(0, grid.clone())]);
        assert_eq!(summary.last, grid);
    }

    #[test]
    fn shape_mismatch_is_a_config_error() {
        let cfg = SimConfig::new(4, 4, 1).unwrap();
        let grid = Grid::from_rows(&["11", "11"]);
        assert!(matches!(Driver::new(cfg, &grid), Err(Error::Config(_))));
    }

    #[test]
    fn unbounded_generation_count_is_refused() {
        let grid = Grid::from_rows(&["1"]);
        let mut cfg = SimConfig::new(1, 1, 1).unwrap();
        cfg.generations = u64::MAX;
        assert!(matches!(Driver::new(cfg, &grid), Err(Error::Config(_))));
    }

    #[test]
    fn sink_failure_still_joins_workers() {
        let cfg = SimConfig::new(4, 4, 10).unwrap().with_workers(4).unwrap();
        let grid = Grid::from_rows(&["1111", "....", "1111", "...."]);
        let mut failing = Failing {
            after: 2,
            finished: false,
        };

        let err = Driver::new(cfg, &grid).unwrap().run(&mut [&mut failing]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(failing.finished);
    }
}
