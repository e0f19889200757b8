//! Thread pool and the policy deciding which pool a task runs on.

pub mod cpu_pool;
pub mod panic_handler;
pub mod policy;
pub(crate) mod task;
pub(crate) mod worker;

pub use cpu_pool::CpuPool;
pub use panic_handler::{PanicHandler, PanicInfo};
pub use policy::{ExecutorPolicy, PoolSource};
