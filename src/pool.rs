use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use crate::{
    barrier::{GenerationBarrier, Work},
    error::{Error, Result},
    partition::PartitionPlan,
    proc::GridState,
};

/// Everything the coordinator and the workers share for one run.
pub struct Context {
    pub grid: GridState,
    pub barrier: GenerationBarrier,
    pub plan: PartitionPlan,
}

impl Context {
    pub fn new(grid: GridState, plan: PartitionPlan, generations: u64) -> Self {
        Context {
            barrier: GenerationBarrier::new(plan.workers(), generations),
            grid,
            plan,
        }
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<u64>>,
}

impl WorkerPool {
    /// Starts one thread per work unit of the plan.
    ///
    /// The barrier counts against the full plan, so if any thread fails to
    /// start the ones already running are stopped and joined before the
    /// error is returned.
    pub fn spawn(ctx: &Arc<Context>) -> Result<Self> {
        let mut handles = Vec::with_capacity(ctx.plan.workers());

        for worker in 0..ctx.plan.workers() {
            let shared = Arc::clone(ctx);
            let spawned = thread::Builder::new()
                .name(format!("life worker {worker}"))
                .spawn(move || work(&shared, worker));

            match spawned {
                Ok(h) => handles.push(h),
                Err(source) => {
                    ctx.barrier.shutdown();
                    if let Err(e) = (WorkerPool { handles }).join() {
                        tracing::error!(error = %e, "partial pool did not stop cleanly");
                    }
                    return Err(Error::Spawn { worker, source });
                }
            }
        }

        tracing::debug!(workers = handles.len(), "worker pool started");
        Ok(WorkerPool { handles })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Joins every worker once the barrier has been shut down. Returns how
    /// many generations each worker computed, by worker id.
    pub fn join(self) -> Result<Vec<u64>> {
        let mut computed = Vec::with_capacity(self.handles.len());
        let mut failed = None;

        for (worker, h) in self.handles.into_iter().enumerate() {
            match h.join() {
                Ok(n) => computed.push(n),
                Err(_) => {
                    tracing::error!(worker, "worker panicked");
                    failed.get_or_insert(worker);
                }
            }
        }

        match failed {
            Some(worker) => Err(Error::WorkerPanicked(worker)),
            None => Ok(computed),
        }
    }
}

/// Reports a worker that unwinds to the barrier, so the coordinator stops
/// waiting for it.
struct CrashGuard<'a> {
    barrier: &'a GenerationBarrier,
    worker: usize,
}

impl Drop for CrashGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.barrier.fail(self.worker);
        }
    }
}

fn work(ctx: &Context, worker: usize) -> u64 {
    let _guard = CrashGuard {
        barrier: &ctx.barrier,
        worker,
    };
    let unit = ctx.plan.units()[worker];
    let mut last_seen = 0;
    let mut computed = 0;

    while let Work::Compute(generation) = ctx.barrier.wait_for_work(last_seen) {
        last_seen = generation;
        for (i, j) in unit.cells() {
            ctx.grid.store_next(i, j, ctx.grid.next_state(i, j));
        }
        computed += 1;
        ctx.barrier.report_done();
    }

    tracing::trace!(worker, computed, "worker stopped");
    computed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{Grid, Rect};

    fn context(rows: &[&str], workers: usize, generations: u64) -> Arc<Context> {
        let grid = Grid::from_rows(rows);
        let plan = PartitionPlan::row_stripes(*grid.size(), workers);
        Arc::new(Context::new(GridState::new(&grid), plan, generations))
    }

    #[test]
    fn one_round_fills_next_buffer() {
        let ctx = context(&[".1.", ".1.", ".1."], 3, 1);
        let pool = WorkerPool::spawn(&ctx).unwrap();
        assert_eq!(pool.len(), 3);

        ctx.barrier.publish(1).unwrap();
        ctx.barrier.await_all().unwrap();
        ctx.grid.swap();
        assert_eq!(ctx.grid.snapshot(), Grid::from_rows(&["...", "111", "..."]));

        ctx.barrier.shutdown();
        assert_eq!(pool.join().unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn crashed_worker_fails_the_round() {
        let grid = Grid::from_rows(&["1..", ".1.", "..1"]);
        // one row too many: worker 1 indexes past the grid
        let plan = PartitionPlan::row_stripes(Rect::new(4, 3), 2);
        let ctx = Arc::new(Context::new(GridState::new(&grid), plan, 3));
        let pool = WorkerPool::spawn(&ctx).unwrap();

        ctx.barrier.publish(1).unwrap();
        assert!(matches!(ctx.barrier.await_all(), Err(Error::WorkerPanicked(1))));

        ctx.barrier.shutdown();
        assert!(matches!(pool.join(), Err(Error::WorkerPanicked(1))));
    }

    #[test]
    fn shutdown_without_work() {
        let ctx = context(&["11", "11"], 2, 5);
        let pool = WorkerPool::spawn(&ctx).unwrap();
        ctx.barrier.shutdown();
        assert_eq!(pool.join().unwrap(), vec![0, 0]);
    }
}
