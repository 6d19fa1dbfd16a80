//! Lock-step coordination between the driver and the worker pool.
//!
//! The driver publishes a generation number, workers notice the change,
//! compute, and report back; the driver waits for the last report before
//! touching the grid again. Shutdown is a generation number one past the
//! last valid one.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Phase {
    /// Nothing published yet.
    Idle,
    /// Generation published, workers computing.
    Running(u64),
    /// Every worker reported for this generation.
    AllDone(u64),
    /// Terminal.
    Shutdown,
}

/// What a worker should do after waking up.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Work {
    Compute(u64),
    Stop,
}

struct State {
    generation: u64,
    done: usize,
    phase: Phase,
    failed: Option<usize>,
}

pub struct GenerationBarrier {
    workers: usize,
    generations: u64,
    state: Mutex<State>,
    start: Condvar,
    finished: Condvar,
}

impl GenerationBarrier {
    /// `generations` must leave room for the stop sentinel, i.e. be below
    /// `u64::MAX`; `SimConfig` enforces this for driver runs.
    pub fn new(workers: usize, generations: u64) -> Self {
        GenerationBarrier {
            workers,
            generations,
            state: Mutex::new(State {
                generation: 0,
                done: 0,
                phase: Phase::Idle,
                failed: None,
            }),
            start: Condvar::new(),
            finished: Condvar::new(),
        }
    }

    // Nothing runs user code under this lock, so a poisoned guard still
    // holds consistent state.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[inline]
    pub fn generations(&self) -> u64 {
        self.generations
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Starts `generation` and wakes every waiting worker.
    ///
    /// Legal from [`Phase::Idle`] or [`Phase::AllDone`], and only for the
    /// generation right after the last one published.
    pub fn publish(&self, generation: u64) -> Result<()> {
        let mut s = self.lock();
        match s.phase {
            Phase::Idle | Phase::AllDone(_) => {}
            phase => return Err(Error::BarrierState { op: "publish", phase }),
        }
        let expected = s.generation.saturating_add(1);
        if generation != expected || generation > self.generations {
            return Err(Error::OutOfOrder { got: generation, expected });
        }

        s.generation = generation;
        s.phase = Phase::Running(generation);
        drop(s);
        self.start.notify_all();
        tracing::trace!(generation, "published");
        Ok(())
    }

    /// Blocks until the published generation differs from `last_seen`.
    ///
    /// The check is against the counter, not the number of wakeups, so a
    /// spurious wakeup just goes back to sleep and a generation is never
    /// computed twice.
    pub fn wait_for_work(&self, last_seen: u64) -> Work {
        let s = self
            .start
            .wait_while(self.lock(), |s| s.generation == last_seen)
            .unwrap_or_else(PoisonError::into_inner);

        if s.generation > self.generations {
            Work::Stop
        } else {
            Work::Compute(s.generation)
        }
    }

    /// Counts one finished worker; the last one wakes the coordinator.
    pub fn report_done(&self) {
        let mut s = self.lock();
        s.done += 1;
        debug_assert!(s.done <= self.workers, "{} reports from {} workers", s.done, self.workers);
        if s.done == self.workers {
            self.finished.notify_one();
        }
    }

    /// Marks `worker` as crashed and wakes the coordinator. Its report will
    /// never come, so the round cannot complete.
    pub fn fail(&self, worker: usize) {
        let mut s = self.lock();
        s.failed.get_or_insert(worker);
        drop(s);
        self.finished.notify_one();
    }

    /// Blocks until every worker reported for the running generation, then
    /// resets the count for the next round. Returns
    /// [`Error::WorkerPanicked`] once a worker has failed. No timeout: a
    /// stuck worker stalls here forever.
    pub fn await_all(&self) -> Result<u64> {
        let s = self.lock();
        let generation = match s.phase {
            Phase::Running(g) => g,
            phase => return Err(Error::BarrierState { op: "await", phase }),
        };

        let mut s = self
            .finished
            .wait_while(s, |s| s.done < self.workers && s.failed.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = s.failed {
            return Err(Error::WorkerPanicked(worker));
        }
        s.done = 0;
        s.phase = Phase::AllDone(generation);
        Ok(generation)
    }

    /// Publishes the stop sentinel. Workers exit on their next wakeup;
    /// joining them is the pool's job.
    pub fn shutdown(&self) {
        let mut s = self.lock();
        s.generation = self.generations.saturating_add(1);
        s.phase = Phase::Shutdown;
        drop(s);
        self.start.notify_all();
        tracing::trace!("barrier shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicU64, AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    #[test]
    fn phases() {
        let b = GenerationBarrier::new(1, 2);
        assert_eq!(b.phase(), Phase::Idle);

        b.publish(1).unwrap();
        assert_eq!(b.phase(), Phase::Running(1));
        assert_eq!(b.wait_for_work(0), Work::Compute(1));
        b.report_done();
        assert_eq!(b.await_all().unwrap(), 1);
        assert_eq!(b.phase(), Phase::AllDone(1));

        b.shutdown();
        assert_eq!(b.phase(), Phase::Shutdown);
        assert_eq!(b.wait_for_work(1), Work::Stop);
    }

    #[test]
    fn misuse_is_an_error() {
        let b = GenerationBarrier::new(1, 3);
        assert!(matches!(b.await_all(), Err(Error::BarrierState { op: "await", phase: Phase::Idle })));
        assert!(matches!(b.publish(2), Err(Error::OutOfOrder { got: 2, expected: 1 })));

        b.publish(1).unwrap();
        assert!(matches!(b.publish(2), Err(Error::BarrierState { op: "publish", .. })));

        b.report_done();
        b.await_all().unwrap();
        assert!(matches!(b.publish(1), Err(Error::OutOfOrder { got: 1, expected: 2 })));
    }

    #[test]
    fn cannot_publish_past_the_last_generation() {
        let b = GenerationBarrier::new(1, 1);
        b.publish(1).unwrap();
        b.report_done();
        b.await_all().unwrap();
        assert!(matches!(b.publish(2), Err(Error::OutOfOrder { .. })));
    }

    #[test]
    fn failed_worker_releases_the_coordinator() {
        let barrier = Arc::new(GenerationBarrier::new(2, 3));
        barrier.publish(1).unwrap();
        barrier.report_done();

        let b = Arc::clone(&barrier);
        let crashed = thread::spawn(move || b.fail(1));

        assert!(matches!(barrier.await_all(), Err(Error::WorkerPanicked(1))));
        crashed.join().unwrap();
        assert!(matches!(barrier.await_all(), Err(Error::WorkerPanicked(1))));
    }

    #[test]
    fn shutdown_before_any_generation() {
        let b = GenerationBarrier::new(2, 0);
        b.shutdown();
        assert_eq!(b.wait_for_work(0), Work::Stop);
    }

    #[test]
    fn lock_step() {
        const WORKERS: usize = 4;
        const GENERATIONS: u64 = 200;

        let barrier = Arc::new(GenerationBarrier::new(WORKERS, GENERATIONS));
        // Highest generation the coordinator has started publishing.
        let announced = Arc::new(AtomicU64::new(0));
        let reports: Arc<Vec<AtomicUsize>> =
            Arc::new((0..=GENERATIONS).map(|_| AtomicUsize::new(0)).collect());

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let announced = Arc::clone(&announced);
                let reports = Arc::clone(&reports);
                thread::spawn(move || {
                    let mut seen = vec![];
                    let mut last = 0;
                    while let Work::Compute(g) = barrier.wait_for_work(last) {
                        assert!(announced.load(Ordering::SeqCst) >= g, "computed {g} before publish");
                        last = g;
                        seen.push(g);
                        reports[g as usize].fetch_add(1, Ordering::SeqCst);
                        barrier.report_done();
                    }
                    seen
                })
            })
            .collect();

        for g in 1..=GENERATIONS {
            announced.store(g, Ordering::SeqCst);
            barrier.publish(g).unwrap();
            assert_eq!(barrier.await_all().unwrap(), g);
            assert_eq!(reports[g as usize].load(Ordering::SeqCst), WORKERS);
        }
        barrier.shutdown();

        for h in handles {
            let seen = h.join().unwrap();
            assert_eq!(seen, (1..=GENERATIONS).collect::<Vec<_>>());
        }
    }
}
