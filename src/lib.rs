//! bginit - background lazy initialization
//!
//! Runs expensive, fallible computations exactly once on worker threads and
//! lets any number of callers block for the result.
//!
//! # Quick Start
//!
//! ```
//! use bginit::prelude::*;
//!
//! // One computation on its own single-thread pool
//! let schema = TaskHandle::new(|| Ok::<_, std::io::Error>(vec!["id", "name"]));
//! schema.start();
//!
//! // A named group sharing one pool
//! let warmup = Aggregator::new();
//! warmup.add_child("cache", TaskHandle::new(|| Ok::<_, std::io::Error>(64))).unwrap();
//! warmup.add_child("index", TaskHandle::new(|| Ok::<_, std::io::Error>(128))).unwrap();
//!
//! assert_eq!(schema.get().unwrap().len(), 2);
//! let results = warmup.get().unwrap();
//! assert_eq!(results.value("index").unwrap(), Some(&128));
//! ```
//!
//! # Features
//!
//! - **Exactly-once start**: concurrent `start()` calls race safely, one wins
//! - **Lazy auto-start**: `get()` schedules work nobody started
//! - **Pool ownership**: pools created by the crate are shut down once their
//!   work is done; pools you pass in are never shut down
//! - **One error type**: computation errors, panics, rejected work and
//!   interrupted waits all surface as [`InitializationError`]
//! - **Interruptible waits**: see [`interrupt`]

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod init;
pub mod interrupt;
pub mod prelude;
pub mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use error::{BoxError, Cause, Error, InitializationError, ProtocolError, Result};
pub use executor::{CpuPool, ExecutorPolicy, PoolSource};
pub use init::{Aggregator, ResultsView, TaskHandle, TaskState};
