//! Dashboard widget cache and background job scheduler.
//!
//! This library exposes the internal modules for the `dashboard-jobs` binary
//! and for integration tests.

pub mod background_jobs;
pub mod clock;
pub mod config;
pub mod dashboard_store;
pub mod metrics;
pub mod search;
pub mod sqlite_persistence;
pub mod widget_cache;

// Re-export commonly used types for convenience
pub use background_jobs::{BackgroundJob, JobContext, JobError, JobScheduler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dashboard_store::{DashboardStore, SqliteDashboardStore};
pub use widget_cache::{CacheKey, WidgetCache, WidgetTtlTable};
