// worker thread stuff
use super::cpu_pool::PoolShared;
use super::task::Task;
use crate::util::Backoff;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug, Default)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub tasks_stolen: AtomicU64,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
    pub state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::default()),
        }
    }

    // main loop: runs until the pool is shut down and every accepted task has run
    pub fn run(&self, stealers: Vec<Stealer<Task>>, injector: Arc<Injector<Task>>, shared: Arc<PoolShared>) {
        let mut backoff = Backoff::new();

        loop {
            if let Some(task) = self.find_task(&stealers, &injector) {
                backoff.reset();
                self.execute_task(task, &shared);
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                continue;
            }

            if shared.is_shutdown() && shared.pending.load(Ordering::Acquire) == 0 {
                break;
            }

            backoff.snooze();
        }

        tracing::trace!(pool = shared.id, worker = self.id, "worker exiting");
    }

    fn find_task(&self, stealers: &[Stealer<Task>], injector: &Injector<Task>) -> Option<Task> {
        // local -> global -> steal
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>]) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() <= 1 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        self.state.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_task(&self, task: Task, shared: &PoolShared) {
        let tid = task.id;
        let queued_for = task.spawn_time.elapsed();
        let start = Instant::now();

        if shared.panics.execute(|| task.execute()).is_ok() {
            tracing::trace!(
                pool = shared.id,
                worker = self.id,
                task = ?tid,
                queued_us = queued_for.as_micros() as u64,
                run_us = start.elapsed().as_micros() as u64,
                "task finished"
            );
        }

        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }
}
