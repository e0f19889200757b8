pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{BoxError, Cause, InitializationError, ProtocolError};
pub use crate::executor::CpuPool;
pub use crate::init::{Aggregator, ResultsView, TaskHandle, TaskState};
