use super::panic_handler::PanicHandler;
use super::task::Task;
use super::worker::{Worker, WorkerId, WorkerState};
use crate::config::Config;
use crate::error::{Error, Result};
use crossbeam_deque::{Injector, Stealer};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// State shared between a pool and its worker threads.
pub(crate) struct PoolShared {
    pub(crate) id: u64,
    shutdown: AtomicBool,
    pub(crate) pending: AtomicUsize,
    live_workers: AtomicUsize,
    exit_lock: Mutex<()>,
    exited: Condvar,
    pub(crate) panics: PanicHandler,
}

impl PoolShared {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn worker_exited(&self) {
        let _guard = self.exit_lock.lock();
        self.live_workers.fetch_sub(1, Ordering::AcqRel);
        self.exited.notify_all();
    }

    fn wait_all_exited(&self) {
        let mut guard = self.exit_lock.lock();
        while self.live_workers.load(Ordering::Acquire) > 0 {
            self.exited.wait(&mut guard);
        }
    }
}

/// Fixed-size pool of worker threads.
///
/// Shutdown is graceful: [`shutdown`](CpuPool::shutdown) stops admission and
/// returns immediately, queued work still runs, then the workers exit.
/// Dropping the pool shuts it down and joins the workers.
pub struct CpuPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<WorkerHandle>>,
    injector: Arc<Injector<Task>>,
    // `true` while accepting work; writers flip it under the lock so no submit
    // can slip in after the workers decided to exit
    accepting: RwLock<bool>,
    next_wake: AtomicUsize,
    num_threads: usize,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
    state: Arc<WorkerState>,
}

impl CpuPool {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let shared = Arc::new(PoolShared {
            id: POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            shutdown: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(0),
            exit_lock: Mutex::new(()),
            exited: Condvar::new(),
            panics: PanicHandler::new(),
        });
        let injector = Arc::new(Injector::new());

        let workers: Vec<Worker> = (0..num_threads).map(Worker::new).collect();
        let stealers: Vec<Stealer<Task>> = workers.iter().map(|w| w.local_queue.stealer()).collect();

        let mut handles: Vec<WorkerHandle> = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let state = worker.state.clone();
            let stealers_clone = stealers.clone();
            let injector_clone = injector.clone();
            let shared_clone = shared.clone();
            let name = format!("{}-{}-{}", config.thread_name_prefix, shared.id, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            shared.live_workers.fetch_add(1, Ordering::AcqRel);
            let spawned = builder.spawn(move || {
                worker.run(stealers_clone, injector_clone, shared_clone.clone());
                shared_clone.worker_exited();
            });

            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                    // stop whatever already started before bailing out
                    shared.shutdown.store(true, Ordering::Release);
                    for handle in &mut handles {
                        handle.unparker.unpark();
                        if let Some(thread) = handle.thread.take() {
                            let _ = thread.join();
                        }
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            };

            let unparker = thread.thread().clone();

            handles.push(WorkerHandle {
                id,
                thread: Some(thread),
                unparker,
                state,
            });
        }

        tracing::debug!(pool = shared.id, threads = num_threads, "thread pool created");

        Ok(Self {
            shared,
            workers: Mutex::new(handles),
            injector,
            accepting: RwLock::new(true),
            next_wake: AtomicUsize::new(0),
            num_threads,
        })
    }

    /// Pool with `num_threads` workers and default settings otherwise.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let config = Config::builder().num_threads(num_threads).build()?;
        Self::new(&config)
    }

    /// Process-unique identifier of this pool.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Queue `f` for execution; fails once the pool has been shut down.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(Error::PoolShutdown(self.shared.id));
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.injector.push(Task::new(f));
        drop(accepting);

        self.wake_one();
        Ok(())
    }

    fn wake_one(&self) {
        let workers = self.workers.lock();
        if workers.is_empty() {
            return;
        }
        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % workers.len();
        workers[idx].unparker.unpark();
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Tasks accepted but not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn completed_tasks(&self) -> u64 {
        self.workers
            .lock()
            .iter()
            .map(|w| w.state.tasks_executed.load(Ordering::Relaxed))
            .sum()
    }

    /// Tasks whose job panicked; the workers survived them.
    pub fn panicked_tasks(&self) -> usize {
        self.shared.panics.panic_count()
    }

    /// Stop accepting work. Returns `true` only for the call that shut it down.
    pub fn shutdown(&self) -> bool {
        let mut accepting = self.accepting.write();
        if !*accepting {
            return false;
        }
        *accepting = false;
        self.shared.shutdown.store(true, Ordering::Release);
        drop(accepting);

        tracing::debug!(pool = self.shared.id, pending = self.pending_tasks(), "thread pool shut down");

        // wake everyone up to check shutdown flag
        for worker in self.workers.lock().iter() {
            worker.unparker.unpark();
        }
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Shut down and every worker has exited.
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.shared.live_workers.load(Ordering::Acquire) == 0
    }

    /// Block until all workers have exited.
    ///
    /// Returns at once if the pool is still accepting work, or if called from
    /// one of the pool's own workers: that worker's job is still pending, so
    /// none of its siblings could exit yet.
    pub fn await_termination(&self) {
        if !self.is_shutdown() {
            return;
        }

        let current = thread::current().id();
        let threads: Vec<(WorkerId, JoinHandle<()>)> = {
            let mut workers = self.workers.lock();
            if workers.iter().any(|w| w.unparker.id() == current) {
                return;
            }
            workers
                .iter_mut()
                .filter_map(|w| w.thread.take().map(|t| (w.id, t)))
                .collect()
        };

        // joined without the worker list locked: a job still inside execute()
        // needs that lock to wake a worker
        for (id, thread) in threads {
            if thread.join().is_err() {
                tracing::warn!(pool = self.shared.id, worker = id, "worker thread panicked");
            }
        }

        // another caller may hold the join handles; wait for the exits themselves
        self.shared.wait_all_exited();
    }
}

impl fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuPool")
            .field("id", &self.shared.id)
            .field("num_threads", &self.num_threads)
            .field("pending", &self.pending_tasks())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for CpuPool {
    fn drop(&mut self) {
        self.shutdown();
        self.await_termination();
    }
}
