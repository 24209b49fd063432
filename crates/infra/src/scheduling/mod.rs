//! Background scheduling.
//!
//! [`SyncScheduler`] runs sync passes on an interval and on demand, with an
//! explicit start/stop lifecycle, a cancellation token and a bounded join.

pub mod error;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{SyncScheduler, SyncSchedulerConfig};
