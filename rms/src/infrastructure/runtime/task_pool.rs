// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Pool
//!
//! A bounded worker pool with completion dependencies, decoupled from
//! the provenance kernel. Jobs are arbitrary closures; a job becomes
//! eligible only when every dependency has reached a terminal state
//! (complete or failed), and at most `n_workers` jobs run at once.
//!
//! One scheduler thread watches the pending queue under a condition
//! variable and dispatches up to the idle-slot count of eligible jobs.
//! Three mutex/condvar pairs guard the pending queue, the worker table,
//! and the finished set; locks are acquired in that order.
//!
//! Workers are spawned threads. Each reports its outcome through an
//! explicit sentinel on a result channel: `Complete(value)`, or
//! `Panicked(message)` when the closure panicked (the body runs under
//! `catch_unwind`). Thread spawn failures are retried up to 10 times
//! with a 3 second backoff; failures inside user code are never retried.
//! Running threads cannot be killed; `cancel` affects pending jobs only.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use rms_domain::RmsError;

const SPAWN_RETRIES: usize = 10;
const SPAWN_BACKOFF: Duration = Duration::from_secs(3);
const WAIT_TICK: Duration = Duration::from_millis(500);

/// Terminal state of one job.
#[derive(Debug, Clone)]
pub enum TaskOutcome<R> {
    Complete(R),
    /// The closure panicked; the payload is the panic message.
    Panicked(String),
    /// The worker thread could not be spawned after all retries.
    SpawnFailed(String),
}

type Job<R> = Box<dyn FnOnce() -> R + Send + 'static>;

struct Pending<R> {
    queue: Vec<(usize, PendingTask<R>)>,
    next_id: usize,
}

struct PendingTask<R> {
    job: Job<R>,
    deps: Vec<usize>,
}

struct PoolInner<R> {
    n_workers: usize,
    pending: Mutex<Pending<R>>,
    pending_cv: Condvar,
    /// Worker table: `None` while running, the outcome once terminal.
    futures: Mutex<BTreeMap<usize, Option<TaskOutcome<R>>>>,
    futures_cv: Condvar,
    finished: Mutex<BTreeSet<usize>>,
    finished_cv: Condvar,
    closing: AtomicBool,
}

impl<R: Send + 'static> PoolInner<R> {
    fn running_count(&self) -> usize {
        let futures = self.futures.lock();
        let finished = self.finished.lock();
        futures.len() - finished.len()
    }

    /// Records a terminal outcome and wakes both the scheduler and any
    /// `get(wait)` callers.
    fn complete(&self, id: usize, outcome: TaskOutcome<R>) {
        {
            let mut futures = self.futures.lock();
            futures.insert(id, Some(outcome));
            let mut finished = self.finished.lock();
            finished.insert(id);
            self.finished_cv.notify_all();
        }
        self.futures_cv.notify_all();
        let _pending = self.pending.lock();
        self.pending_cv.notify_all();
        debug!(task = id, "pool job reached a terminal state");
    }
}

/// Bounded, dependency-aware worker pool.
pub struct TaskPool<R: Send + 'static> {
    inner: Arc<PoolInner<R>>,
    scheduler: Option<thread::JoinHandle<()>>,
}

impl<R: Send + 'static> TaskPool<R> {
    /// Creates a pool running at most `n_workers` jobs concurrently.
    pub fn new(n_workers: usize) -> Result<Self, RmsError> {
        if n_workers == 0 {
            return Err(RmsError::pool_error("pool needs at least one worker"));
        }
        let inner = Arc::new(PoolInner {
            n_workers,
            pending: Mutex::new(Pending { queue: Vec::new(), next_id: 0 }),
            pending_cv: Condvar::new(),
            futures: Mutex::new(BTreeMap::new()),
            futures_cv: Condvar::new(),
            finished: Mutex::new(BTreeSet::new()),
            finished_cv: Condvar::new(),
            closing: AtomicBool::new(false),
        });
        let scheduler_inner = Arc::clone(&inner);
        let scheduler = thread::Builder::new()
            .name("rms-pool-scheduler".to_string())
            .spawn(move || scheduler_loop(scheduler_inner))
            .map_err(|e| RmsError::pool_error(format!("cannot spawn scheduler: {e}")))?;
        Ok(Self { inner, scheduler: Some(scheduler) })
    }

    /// Submits a job, eligible once every id in `deps` is terminal.
    ///
    /// Returns the job's monotonically increasing local id.
    pub fn submit(
        &self,
        job: impl FnOnce() -> R + Send + 'static,
        deps: &[usize],
    ) -> Result<usize, RmsError> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(RmsError::pool_error("pool is closing"));
        }
        let mut pending = self.inner.pending.lock();
        let id = pending.next_id;
        pending.next_id += 1;
        pending.queue.push((
            id,
            PendingTask { job: Box::new(job), deps: deps.to_vec() },
        ));
        self.inner.pending_cv.notify_all();
        debug!(task = id, deps = deps.len(), "submitted pool job");
        Ok(id)
    }

    /// Removes jobs from the pending queue. Running jobs are unaffected.
    ///
    /// Returns the ids actually removed.
    pub fn cancel(&self, ids: &[usize]) -> Vec<usize> {
        let mut pending = self.inner.pending.lock();
        let before = pending.queue.len();
        let mut removed = Vec::new();
        pending.queue.retain(|(id, _)| {
            if ids.contains(id) {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        if pending.queue.len() != before {
            self.inner.pending_cv.notify_all();
        }
        removed
    }

    /// Removes every pending job.
    pub fn cancel_all(&self) -> Vec<usize> {
        let mut pending = self.inner.pending.lock();
        let removed = pending.queue.drain(..).map(|(id, _)| id).collect();
        self.inner.pending_cv.notify_all();
        removed
    }
}

impl<R: Send + Clone + 'static> TaskPool<R> {
    /// Collects completed results keyed by submission id.
    ///
    /// With `wait`, blocks until nothing is pending or running. Jobs
    /// that did not complete are logged and omitted; see
    /// [`TaskPool::results_detailed`] for their outcomes.
    pub fn get(&self, wait: bool) -> BTreeMap<usize, R> {
        if wait {
            self.wait_idle();
        }

        let futures = self.inner.futures.lock();
        let finished = self.inner.finished.lock();
        let mut results = BTreeMap::new();
        let mut failed: Vec<usize> = Vec::new();
        for id in finished.iter() {
            match futures.get(id) {
                Some(Some(TaskOutcome::Complete(value))) => {
                    results.insert(*id, value.clone());
                }
                _ => failed.push(*id),
            }
        }
        if !failed.is_empty() {
            warn!(tasks = ?failed, "pool jobs did not complete");
        }
        results
    }

    /// Terminal outcomes of every finished job, keyed by submission id.
    pub fn results_detailed(&self) -> BTreeMap<usize, TaskOutcome<R>> {
        let futures = self.inner.futures.lock();
        let finished = self.inner.finished.lock();
        finished
            .iter()
            .filter_map(|id| {
                futures
                    .get(id)
                    .and_then(|slot| slot.clone())
                    .map(|outcome| (*id, outcome))
            })
            .collect()
    }

    /// Flips the closing flag and drains: blocks until every submitted
    /// job is terminal, then returns the completed results.
    pub fn close(&self) -> BTreeMap<usize, R> {
        self.inner.closing.store(true, Ordering::SeqCst);
        {
            let _pending = self.inner.pending.lock();
            self.inner.pending_cv.notify_all();
        }
        self.get(true)
    }

    fn wait_idle(&self) {
        // Wait until the pending queue drains.
        {
            let mut pending = self.inner.pending.lock();
            while !pending.queue.is_empty() {
                self.inner.pending_cv.wait(&mut pending);
            }
        }
        // Then until no worker is mid-flight. The timed wait covers the
        // window between the running-count probe and the next notify.
        loop {
            if self.inner.running_count() == 0 {
                break;
            }
            let mut finished = self.inner.finished.lock();
            self.inner
                .finished_cv
                .wait_for(&mut finished, WAIT_TICK);
        }
    }
}

impl<R: Send + 'static> Drop for TaskPool<R> {
    fn drop(&mut self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        {
            // Jobs never dispatched are dropped; otherwise a pending job
            // with an unsatisfiable dependency would block the join
            // forever.
            let mut pending = self.inner.pending.lock();
            pending.queue.clear();
            self.inner.pending_cv.notify_all();
        }
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}

fn scheduler_loop<R: Send + 'static>(inner: Arc<PoolInner<R>>) {
    loop {
        // Decide what to launch while holding the pending lock; launch
        // after releasing it so spawn retries never block submitters.
        let to_launch: Vec<(usize, PendingTask<R>)> = {
            let mut pending = inner.pending.lock();
            if inner.closing.load(Ordering::SeqCst) && pending.queue.is_empty() {
                break;
            }

            let running = inner.running_count();
            if running >= inner.n_workers {
                inner.pending_cv.wait(&mut pending);
                continue;
            }
            let idle = inner.n_workers - running;

            let eligible: Vec<usize> = {
                let finished = inner.finished.lock();
                pending
                    .queue
                    .iter()
                    .filter(|(_, task)| task.deps.iter().all(|dep| finished.contains(dep)))
                    .map(|(id, _)| *id)
                    .take(idle)
                    .collect()
            };
            if eligible.is_empty() {
                inner.pending_cv.wait(&mut pending);
                continue;
            }

            let mut launches = Vec::with_capacity(eligible.len());
            let mut kept = Vec::with_capacity(pending.queue.len());
            for (id, task) in pending.queue.drain(..) {
                if eligible.contains(&id) {
                    launches.push((id, task));
                } else {
                    kept.push((id, task));
                }
            }
            pending.queue = kept;
            {
                let mut futures = inner.futures.lock();
                for (id, _) in &launches {
                    futures.insert(*id, None);
                }
            }
            launches
        };

        info!(launching = to_launch.len(), "dispatching eligible pool jobs");
        for (id, task) in to_launch {
            launch_worker(Arc::clone(&inner), id, task.job);
        }
    }
}

fn launch_worker<R: Send + 'static>(inner: Arc<PoolInner<R>>, id: usize, job: Job<R>) {
    let (result_tx, result_rx) = bounded::<TaskOutcome<R>>(1);

    // The job lives in a shared slot so a failed spawn attempt does not
    // consume it; whichever thread finally starts takes it out.
    let slot: Arc<Mutex<Option<(Job<R>, Sender<TaskOutcome<R>>)>>> =
        Arc::new(Mutex::new(Some((job, result_tx))));
    let mut spawned = false;
    for trial in 0..SPAWN_RETRIES {
        let slot = Arc::clone(&slot);
        let attempt = thread::Builder::new()
            .name(format!("rms-pool-worker-{id}"))
            .spawn(move || {
                if let Some((job, result_tx)) = slot.lock().take() {
                    run_job(job, result_tx);
                }
            });
        match attempt {
            Ok(_) => {
                spawned = true;
                break;
            }
            Err(e) => {
                warn!(task = id, trial, error = %e, "worker spawn failed; retrying");
                thread::sleep(SPAWN_BACKOFF);
            }
        }
    }
    if !spawned {
        // Dropping the slot drops the sender; the watcher below turns
        // the disconnect into a SpawnFailed outcome.
        slot.lock().take();
    }

    thread::spawn(move || match result_rx.recv() {
        Ok(outcome) => inner.complete(id, outcome),
        Err(_) => inner.complete(
            id,
            TaskOutcome::SpawnFailed("worker never started or exited without an outcome".to_string()),
        ),
    });
}

fn run_job<R: Send + 'static>(job: Job<R>, result_tx: Sender<TaskOutcome<R>>) {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(value) => TaskOutcome::Complete(value),
        Err(payload) => TaskOutcome::Panicked(panic_message(payload)),
    };
    let _ = result_tx.send(outcome);
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_results_keyed_by_submission_order() {
        let pool: TaskPool<i64> = TaskPool::new(2).unwrap();
        let a = pool.submit(|| 1, &[]).unwrap();
        let b = pool.submit(|| 2, &[]).unwrap();
        let c = pool.submit(|| 3, &[]).unwrap();
        let results = pool.get(true);
        assert_eq!(results.get(&a), Some(&1));
        assert_eq!(results.get(&b), Some(&2));
        assert_eq!(results.get(&c), Some(&3));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_dependencies_gate_start() {
        let pool: TaskPool<usize> = TaskPool::new(2).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let t1 = pool
            .submit(
                move || {
                    thread::sleep(Duration::from_millis(50));
                    o1.lock().push(1);
                    1
                },
                &[],
            )
            .unwrap();
        let o2 = Arc::clone(&order);
        let t2 = pool
            .submit(
                move || {
                    thread::sleep(Duration::from_millis(50));
                    o2.lock().push(2);
                    2
                },
                &[],
            )
            .unwrap();
        let o3 = Arc::clone(&order);
        let t3 = pool
            .submit(
                move || {
                    o3.lock().push(3);
                    3
                },
                &[t1, t2],
            )
            .unwrap();

        let results = pool.get(true);
        assert_eq!(results.len(), 3);
        let seen = order.lock().clone();
        // The dependent job observes both dependencies first.
        assert_eq!(seen.last(), Some(&3));
        assert_eq!(results.get(&t3), Some(&3));
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let pool: TaskPool<usize> = TaskPool::new(2).unwrap();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            pool.submit(
                move || {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(30));
                    live.fetch_sub(1, Ordering::SeqCst);
                    0
                },
                &[],
            )
            .unwrap();
        }
        pool.get(true);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_panicked_job_is_reported_not_returned() {
        let pool: TaskPool<usize> = TaskPool::new(1).unwrap();
        let bad = pool.submit(|| panic!("boom"), &[]).unwrap();
        let good = pool.submit(|| 7, &[bad]).unwrap();

        let results = pool.get(true);
        assert!(!results.contains_key(&bad));
        // Terminal failure still unblocks dependents.
        assert_eq!(results.get(&good), Some(&7));
        let detailed = pool.results_detailed();
        assert!(matches!(detailed.get(&bad), Some(TaskOutcome::Panicked(m)) if m == "boom"));
    }

    #[test]
    fn test_cancel_removes_pending_only() {
        let pool: TaskPool<usize> = TaskPool::new(1).unwrap();
        let blocker = pool
            .submit(
                || {
                    thread::sleep(Duration::from_millis(100));
                    0
                },
                &[],
            )
            .unwrap();
        // Depends on the blocker, so it stays pending long enough to
        // cancel.
        let doomed = pool.submit(|| 1, &[blocker]).unwrap();
        let removed = pool.cancel(&[doomed]);
        assert_eq!(removed, vec![doomed]);
        let results = pool.get(true);
        assert!(results.contains_key(&blocker));
        assert!(!results.contains_key(&doomed));
    }

    #[test]
    fn test_close_rejects_new_submissions() {
        let pool: TaskPool<usize> = TaskPool::new(1).unwrap();
        pool.submit(|| 1, &[]).unwrap();
        pool.close();
        assert!(pool.submit(|| 2, &[]).is_err());
    }
}
