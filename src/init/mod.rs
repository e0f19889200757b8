//! Background lazy initialization: single tasks and named task groups.

mod aggregator;
mod cell;
mod handle;
mod results;

pub use aggregator::Aggregator;
pub use handle::{TaskHandle, TaskState};
pub use results::ResultsView;
