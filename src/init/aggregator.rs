use super::handle::TaskHandle;
use super::results::ResultsView;
use crate::config::Config;
use crate::error::{InitializationError, ProtocolError};
use crate::executor::{CpuPool, ExecutorPolicy, PoolSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A named group of [`TaskHandle`]s started together on a shared pool.
///
/// Children are registered with [`add_child`](Aggregator::add_child) before
/// [`start`](Aggregator::start). At start time the aggregator uses the pool it
/// was given, or creates one sized to the group, and hands it to every child
/// that has no pool of its own. [`get`](Aggregator::get) waits for all
/// children; a failing child is recorded in the [`ResultsView`] and never
/// stops its siblings.
///
/// ```
/// use bginit::{Aggregator, TaskHandle};
///
/// let group = Aggregator::new();
/// group.add_child("users", TaskHandle::new(|| Ok::<_, std::io::Error>(120))).unwrap();
/// group.add_child("orders", TaskHandle::new(|| Ok::<_, std::io::Error>(7))).unwrap();
///
/// let results = group.get().unwrap();
/// assert_eq!(results.value("users").unwrap(), Some(&120));
/// assert!(results.is_successful());
/// ```
pub struct Aggregator<T> {
    state: Mutex<GroupState<T>>,
    config: Config,
    results: OnceLock<ResultsView<T>>,
}

struct GroupState<T> {
    children: HashMap<String, TaskHandle<T>>,
    started: bool,
    external_pool: Option<Arc<CpuPool>>,
    pool: Option<PoolSource>,
}

impl<T: Clone + Send + 'static> Aggregator<T> {
    pub fn new() -> Self {
        Self::build(None, Config::default())
    }

    /// Run every child lacking its own pool on `pool`. It is never shut down here.
    pub fn with_pool(pool: Arc<CpuPool>) -> Self {
        Self::build(Some(pool), Config::default())
    }

    /// Build the shared pool from `config`; its thread count is set to the group size.
    pub fn with_config(config: Config) -> Self {
        Self::build(None, config)
    }

    fn build(external_pool: Option<Arc<CpuPool>>, config: Config) -> Self {
        Self {
            state: Mutex::new(GroupState {
                children: HashMap::new(),
                started: false,
                external_pool,
                pool: None,
            }),
            config,
            results: OnceLock::new(),
        }
    }

    /// Register `handle` under `name`. Fails for a taken name or after start.
    pub fn add_child(&self, name: impl Into<String>, handle: TaskHandle<T>) -> Result<(), ProtocolError> {
        let name = name.into();
        let mut state = self.state.lock();
        if state.started {
            return Err(ProtocolError::AlreadyStarted);
        }
        if state.children.contains_key(&name) {
            return Err(ProtocolError::DuplicateName(name));
        }
        state.children.insert(name, handle);
        Ok(())
    }

    /// Start every child. Returns `true` only for the call that did so.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.started {
            return false;
        }
        state.started = true;

        let capacity = state.children.values().map(TaskHandle::task_count).sum();
        let resolved = ExecutorPolicy::resolve(state.external_pool.as_ref(), capacity, &self.config);
        match resolved {
            Ok(source) => {
                for (name, child) in &state.children {
                    if child.external_pool().is_some() {
                        continue;
                    }
                    if let Err(e) = child.set_external_pool(Arc::clone(source.pool())) {
                        tracing::debug!(child = %name, error = %e, "child keeps the pool it started on");
                    }
                }
                tracing::debug!(
                    pool = source.pool().id(),
                    owned = source.is_owned(),
                    children = state.children.len(),
                    "starting task group"
                );
                state.pool = Some(source);
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not create shared pool, children use their own");
            }
        }

        let children: Vec<TaskHandle<T>> = state.children.values().cloned().collect();
        drop(state);

        for child in children {
            child.start();
        }
        true
    }

    /// Wait for every child and report their outcomes.
    ///
    /// Starts the group if needed. Child failures end up in the returned
    /// view; the only error is an interruption of the calling thread, which
    /// leaves the thread's interrupted flag set. The shared pool, if owned,
    /// is shut down once all children have finished.
    pub fn get(&self) -> Result<ResultsView<T>, InitializationError> {
        if let Some(view) = self.results.get() {
            return Ok(view.clone());
        }
        self.start();

        let children: Vec<(String, TaskHandle<T>)> = self
            .state
            .lock()
            .children
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let mut outcomes = Vec::with_capacity(children.len());
        for (name, child) in children {
            let outcome = match child.get() {
                Err(err) if err.is_interrupted() => {
                    tracing::debug!(child = %name, "interrupted while waiting for task group");
                    return Err(err);
                }
                outcome => outcome,
            };
            outcomes.push((name, child, outcome));
        }

        let view = self.results.get_or_init(|| {
            if let Some(source) = &self.state.lock().pool {
                if source.release() {
                    tracing::debug!(pool = source.pool().id(), "released shared pool");
                }
            }
            ResultsView::new(outcomes)
        });
        Ok(view.clone())
    }
}

impl<T> Aggregator<T> {
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn len(&self) -> usize {
        self.state.lock().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().children.is_empty()
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.state.lock().children.keys().cloned().collect()
    }

    /// The shared pool handed to children; `None` before start.
    pub fn pool_in_use(&self) -> Option<Arc<CpuPool>> {
        self.state.lock().pool.as_ref().map(|source| Arc::clone(source.pool()))
    }

    pub fn external_pool(&self) -> Option<Arc<CpuPool>> {
        self.state.lock().external_pool.clone()
    }

    /// Use `pool` as the shared pool. Only allowed before start.
    pub fn set_external_pool(&self, pool: Arc<CpuPool>) -> Result<(), ProtocolError> {
        let mut state = self.state.lock();
        if state.started {
            return Err(ProtocolError::AlreadyStarted);
        }
        state.external_pool = Some(pool);
        Ok(())
    }

    /// Worker threads the whole group occupies while running.
    pub fn task_count(&self) -> usize {
        self.state.lock().children.values().map(TaskHandle::task_count).sum()
    }
}

impl<T: Clone + Send + 'static> Default for Aggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Aggregator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Aggregator")
            .field("children", &state.children.len())
            .field("started", &state.started)
            .field("pool", &state.pool.as_ref().map(|source| source.pool().id()))
            .field("finished", &self.results.get().is_some())
            .finish()
    }
}
