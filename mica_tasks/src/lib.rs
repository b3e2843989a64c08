//! Fixed pool of worker threads with barrier-style dispatch.
//!
//! [`TaskPool`] owns a set of OS threads that park until a job is
//! dispatched. [`dispatch`] hands the same job to every worker exactly
//! once, tagged with the worker's index, and returns only after all
//! workers have finished. This makes a dispatch a full barrier: every
//! effect of job `n` happens-before the first invocation of job `n + 1`.
//!
//! [`dispatch`]: TaskPool::dispatch

use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

/// Per-worker identity of a dispatched job.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Invocation {
    /// Index of the worker running this invocation, in `0..workers`.
    pub worker: usize,
    /// Total number of workers in the pool.
    pub workers: usize,
}

#[derive(Debug)]
pub struct TaskPool {
    shared: &'static Shared,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Creates a pool with `workers` threads.
    ///
    /// At least one worker is always spawned.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);

        // The pool and its workers need to share state without the workers
        // borrowing from the pool struct. The shared block is leaked and
        // reclaimed in `Drop` once every worker has been joined.
        let shared: &'static Shared = Box::leak(Box::new(Shared {
            state: Mutex::new(State {
                job: None,
                epoch: 0,
                remaining: 0,
                shutdown: false,
            }),
            job_ready: Condvar::new(),
            job_done: Condvar::new(),
        }));

        let handles = spawn_workers(shared, workers, 0);

        Self {
            shared,
            workers: handles,
        }
    }

    /// Returns the number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Runs `job` once on every worker and blocks until all invocations
    /// have returned.
    ///
    /// The job observes its own worker index via [`Invocation`], which is
    /// how callers partition work across the pool. Jobs run concurrently
    /// and must not assume any ordering between workers within a single
    /// dispatch.
    pub fn dispatch<F>(&self, job: F)
    where
        F: Fn(Invocation) + Sync,
    {
        // SAFETY: `call` is only invoked while `data` points at `job`,
        // which outlives the wait loop below because `dispatch` does not
        // return until every worker has signalled completion.
        let raw = RawJob {
            data: &job as *const F as *const (),
            call: |data, invocation| unsafe { (*data.cast::<F>())(invocation) },
        };

        let mut state = self.shared.state.lock();
        debug_assert!(state.remaining == 0);

        state.job = Some(raw);
        state.epoch += 1;
        state.remaining = self.workers.len();
        let epoch = state.epoch;
        self.shared.job_ready.notify_all();

        while state.remaining != 0 || state.epoch != epoch {
            self.shared.job_done.wait(&mut state);
        }

        state.job = None;
    }

    /// Replaces the worker set with `workers` fresh threads.
    ///
    /// Blocks until the previous workers have shut down. Any dispatched
    /// work has already completed by then because `dispatch` is itself a
    /// barrier.
    pub fn resize(&mut self, workers: usize) {
        let workers = workers.max(1);
        if workers == self.workers.len() {
            return;
        }

        self.join_workers();

        let epoch = {
            let mut state = self.shared.state.lock();
            state.shutdown = false;
            state.epoch
        };

        self.workers = spawn_workers(self.shared, workers, epoch);
    }

    fn join_workers(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.job_ready.notify_all();
        }

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.join_workers();

        // SAFETY: All workers are joined; nothing references the shared
        // block anymore and it was created by `Box::leak` in `new`.
        unsafe {
            drop(Box::from_raw(self.shared as *const Shared as *mut Shared));
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    job_ready: Condvar,
    job_done: Condvar,
}

#[derive(Debug)]
struct State {
    job: Option<RawJob>,
    /// Incremented once per dispatch so parked workers can tell a new job
    /// from a spurious wakeup.
    epoch: u64,
    /// Workers that have not yet finished the current job.
    remaining: usize,
    shutdown: bool,
}

/// Type-erased borrow of the dispatched closure.
#[derive(Copy, Clone, Debug)]
struct RawJob {
    data: *const (),
    call: fn(*const (), Invocation),
}

// SAFETY: `data` points at a closure bounded by `Sync` in `dispatch`,
// and the pointee is kept alive for the whole dispatch.
unsafe impl Send for RawJob {}

fn spawn_workers(
    shared: &'static Shared,
    workers: usize,
    start_epoch: u64,
) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|index| {
            std::thread::Builder::new()
                .name(format!("mica-worker-{}", index))
                .spawn(move || worker_main(shared, index, workers, start_epoch))
                .expect("failed to spawn worker thread")
        })
        .collect()
}

fn worker_main(shared: &'static Shared, worker: usize, workers: usize, start_epoch: u64) {
    // Epochs from before this worker existed are not its work; claiming
    // one would double-run a finished job.
    let mut seen_epoch = start_epoch;

    loop {
        let job;
        {
            let mut state = shared.state.lock();
            while state.epoch == seen_epoch && !state.shutdown {
                shared.job_ready.wait(&mut state);
            }

            if state.shutdown {
                return;
            }

            seen_epoch = state.epoch;
            job = state.job.expect("woken without a job");
        }

        (job.call)(job.data, Invocation { worker, workers });

        let mut state = shared.state.lock();
        state.remaining -= 1;
        if state.remaining == 0 {
            shared.job_done.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::TaskPool;

    #[test]
    fn dispatch_runs_once_per_worker() {
        let pool = TaskPool::new(4);
        let counter = AtomicUsize::new(0);
        let seen: [AtomicUsize; 4] = std::array::from_fn(|_| AtomicUsize::new(0));

        pool.dispatch(|invocation| {
            counter.fetch_add(1, Ordering::SeqCst);
            seen[invocation.worker].fetch_add(1, Ordering::SeqCst);
            assert_eq!(invocation.workers, 4);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 4);
        for worker in &seen {
            assert_eq!(worker.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn dispatch_is_a_barrier() {
        let pool = TaskPool::new(3);
        let values: Vec<AtomicUsize> = (0..64).map(|_| AtomicUsize::new(0)).collect();

        pool.dispatch(|invocation| {
            for (index, value) in values.iter().enumerate() {
                if index % invocation.workers == invocation.worker {
                    value.store(index + 1, Ordering::Relaxed);
                }
            }
        });

        // Everything written by the first dispatch must be visible to the
        // second one, on every worker.
        pool.dispatch(|_| {
            for (index, value) in values.iter().enumerate() {
                assert_eq!(value.load(Ordering::Relaxed), index + 1);
            }
        });
    }

    #[test]
    fn resize_changes_worker_count() {
        let mut pool = TaskPool::new(2);
        assert_eq!(pool.workers(), 2);

        pool.resize(5);
        assert_eq!(pool.workers(), 5);

        let counter = AtomicUsize::new(0);
        pool.dispatch(|_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let pool = TaskPool::new(0);
        assert_eq!(pool.workers(), 1);
    }
}
