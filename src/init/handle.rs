//! One computation, run once in the background, awaited by any number of callers.

use super::cell::ResultCell;
use crate::config::Config;
use crate::error::{BoxError, Cause, InitializationError, ProtocolError};
use crate::executor::panic_handler::catch_panic;
use crate::executor::{CpuPool, ExecutorPolicy};
use crate::interrupt::{self, Interrupted};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Computation<T> = Box<dyn FnOnce() -> Result<T, BoxError> + Send + 'static>;

pub(crate) type Outcome<T> = Result<T, InitializationError>;

/// Lifecycle of a [`TaskHandle`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    NotStarted,
    Scheduled,
    Completed,
}

/// Handle to a computation that runs at most once on a worker thread.
///
/// Clones share the same computation and result. The work is scheduled by
/// the first [`start`](TaskHandle::start), or by the first
/// [`get`](TaskHandle::get) if nobody started it.
///
/// ```
/// use bginit::TaskHandle;
///
/// let config = TaskHandle::new(|| Ok::<_, std::io::Error>(String::from("loaded")));
/// assert!(config.start());
/// assert_eq!(config.get().unwrap(), "loaded");
/// assert!(config.pool_in_use().unwrap().is_shutdown());
/// ```
pub struct TaskHandle<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    launch: Mutex<Launch<T>>,
    cell: Arc<ResultCell<Outcome<T>>>,
    config: Config,
}

// everything start() decides under the lock
struct Launch<T> {
    started: bool,
    computation: Option<Computation<T>>,
    external_pool: Option<Arc<CpuPool>>,
    pool_in_use: Option<Arc<CpuPool>>,
}

impl<T: Clone + Send + 'static> TaskHandle<T> {
    /// Computation that runs on a single-thread pool created at start time.
    pub fn new<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::build(f, None, Config::default())
    }

    /// Computation that runs on `pool`. The handle never shuts `pool` down.
    pub fn with_pool<F, E>(f: F, pool: Arc<CpuPool>) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::build(f, Some(pool), Config::default())
    }

    /// Like [`new`](TaskHandle::new), building the owned pool from `config`.
    /// The thread count is always one.
    pub fn with_config<F, E>(f: F, config: Config) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::build(f, None, config)
    }

    fn build<F, E>(f: F, external_pool: Option<Arc<CpuPool>>, config: Config) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let computation: Computation<T> = Box::new(move || f().map_err(Into::into));
        Self {
            inner: Arc::new(Inner {
                launch: Mutex::new(Launch {
                    started: false,
                    computation: Some(computation),
                    external_pool,
                    pool_in_use: None,
                }),
                cell: Arc::new(ResultCell::new()),
                config,
            }),
        }
    }

    /// Schedule the computation.
    ///
    /// Returns `true` only for the call that scheduled it; every other call,
    /// concurrent or later, returns `false` and does nothing.
    pub fn start(&self) -> bool {
        let mut launch = self.inner.launch.lock();
        if launch.started {
            return false;
        }
        launch.started = true;

        let computation = match launch.computation.take() {
            Some(computation) => computation,
            None => return false,
        };

        let resolved = ExecutorPolicy::resolve(launch.external_pool.as_ref(), self.task_count(), &self.inner.config);
        let source = match resolved {
            Ok(source) => source,
            Err(e) => {
                drop(launch);
                tracing::warn!(error = %e, "could not create a pool for task");
                self.inner.cell.set(Err(InitializationError::rejected(e.to_string())));
                return true;
            }
        };
        let pool = Arc::clone(source.pool());
        launch.pool_in_use = Some(Arc::clone(&pool));
        drop(launch);

        let cell = Arc::clone(&self.inner.cell);
        let job = move || {
            let outcome = run(computation);
            // an owned pool has nothing left to serve once this job is done
            source.release();
            cell.set(outcome);
        };

        match pool.execute(job) {
            Ok(()) => tracing::trace!(pool = pool.id(), "task scheduled"),
            Err(e) => {
                tracing::warn!(pool = pool.id(), error = %e, "task rejected by pool");
                self.inner.cell.set(Err(InitializationError::rejected(e.to_string())));
            }
        }
        true
    }

    /// Block until the computation finished and return its value.
    ///
    /// Starts the computation first if nobody did. If the calling thread is
    /// interrupted while blocked, the wait ends with [`Cause::Interrupted`]
    /// and the thread's interrupted flag stays set; the computation keeps
    /// running and later calls can still collect its result.
    pub fn get(&self) -> Result<T, InitializationError> {
        self.start();
        match self.inner.cell.wait() {
            Ok(outcome) => outcome,
            Err(Interrupted) => {
                interrupt::current().interrupt();
                Err(InitializationError::interrupted())
            }
        }
    }

    /// The result if the computation already finished. Never starts it.
    pub fn try_get(&self) -> Option<Result<T, InitializationError>> {
        self.inner.cell.peek()
    }
}

impl<T> TaskHandle<T> {
    pub fn is_started(&self) -> bool {
        self.inner.launch.lock().started
    }

    pub fn state(&self) -> TaskState {
        if self.inner.cell.is_set() {
            TaskState::Completed
        } else if self.is_started() {
            TaskState::Scheduled
        } else {
            TaskState::NotStarted
        }
    }

    /// Finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.inner.cell.is_set()
    }

    /// Finished with a value.
    pub fn is_initialized(&self) -> bool {
        self.inner.cell.inspect(|outcome| matches!(outcome, Some(Ok(_))))
    }

    /// The pool the computation was submitted to; `None` before start.
    pub fn pool_in_use(&self) -> Option<Arc<CpuPool>> {
        self.inner.launch.lock().pool_in_use.clone()
    }

    pub fn external_pool(&self) -> Option<Arc<CpuPool>> {
        self.inner.launch.lock().external_pool.clone()
    }

    /// Run on `pool` instead of an owned one. Only allowed before start.
    pub fn set_external_pool(&self, pool: Arc<CpuPool>) -> Result<(), ProtocolError> {
        let mut launch = self.inner.launch.lock();
        if launch.started {
            return Err(ProtocolError::AlreadyStarted);
        }
        launch.external_pool = Some(pool);
        Ok(())
    }

    /// Worker threads this handle occupies while running.
    pub fn task_count(&self) -> usize {
        1
    }

    /// Whether both handles refer to the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn run<T>(computation: Computation<T>) -> Outcome<T> {
    match catch_panic(computation) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(InitializationError::computation(err)),
        Err(info) => {
            tracing::warn!(panic = %info, "computation panicked");
            Err(InitializationError::new(Cause::Panicked(info)))
        }
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("state", &self.state())
            .field("pool", &self.pool_in_use().map(|p| p.id()))
            .finish()
    }
}
