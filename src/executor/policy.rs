//! Who runs a task's work, and who shuts that pool down afterwards.

use super::cpu_pool::CpuPool;
use crate::config::Config;
use crate::error::Result;
use std::sync::Arc;

/// Outcome of [`ExecutorPolicy::resolve`].
#[derive(Debug, Clone)]
pub enum PoolSource {
    /// Supplied by the caller, who keeps responsibility for shutting it down.
    External(Arc<CpuPool>),
    /// Created for this owner; released exactly once when its work is done.
    Owned(Arc<CpuPool>),
}

impl PoolSource {
    pub fn pool(&self) -> &Arc<CpuPool> {
        match self {
            PoolSource::External(pool) | PoolSource::Owned(pool) => pool,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, PoolSource::Owned(_))
    }

    /// Shut the pool down if this source owns it.
    ///
    /// Returns `true` if this call performed the shutdown; external pools and
    /// already released pools yield `false`.
    pub fn release(&self) -> bool {
        match self {
            PoolSource::Owned(pool) => pool.shutdown(),
            PoolSource::External(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorPolicy;

impl ExecutorPolicy {
    /// Use `external` when given, else build a pool of `capacity` threads
    /// (never fewer than one) from `config` and hand over its ownership.
    pub fn resolve(external: Option<&Arc<CpuPool>>, capacity: usize, config: &Config) -> Result<PoolSource> {
        if let Some(pool) = external {
            return Ok(PoolSource::External(Arc::clone(pool)));
        }

        let pool = CpuPool::new(&config.with_capacity(capacity))?;
        tracing::debug!(pool = pool.id(), capacity = pool.num_threads(), "created owned pool");
        Ok(PoolSource::Owned(Arc::new(pool)))
    }
}
