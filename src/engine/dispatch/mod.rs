mod dispatcher;
mod partition;
mod task;

pub use dispatcher::{Dispatch, ExecutionDispatcher};
pub use partition::Partitioner;
pub use task::{ExecutionTask, TaskSlot, TaskTracker};

#[cfg(test)]
mod dispatcher_test;
