//! Background job scheduling and execution.
//!
//! Jobs run on fixed intervals or once a day at a local wall-clock time. The
//! scheduler persists each job's next run time and keeps a history of runs in
//! the dashboard database.

mod context;
mod job;
pub mod jobs;
mod schedule;
mod scheduler;
mod status;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule};
pub use scheduler::JobScheduler;
pub use status::{JobInfo, JobRunInfo, JobScheduleInfo, SchedulerStatus};
