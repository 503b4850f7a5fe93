//! Observation of the repository's background tasks.
//!
//! [`TaskMonitor`] keeps three views (all tasks, unfinished tasks, one selected task)
//! that are fetched and fail independently of each other. [`poller`] drives them on an
//! interval.

pub mod monitor;
pub mod poller;

pub use monitor::{TaskDetailView, TaskListView, TaskMonitor, TaskMonitorSnapshot, TaskViews};
pub use poller::{PollConfig, PollHandle};
