//! Widget cache cleanup background job.
//!
//! Evicts expired entries from the memory tier and deletes expired rows from
//! the persistent tier.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::config::CacheCleanupJobSettings;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub struct CacheCleanupJob {
    interval_minutes: u64,
}

impl CacheCleanupJob {
    pub const ID: &'static str = "cache_cleanup";

    pub fn from_settings(settings: &CacheCleanupJobSettings) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
        }
    }
}

#[async_trait]
impl BackgroundJob for CacheCleanupJob {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Cache Cleanup"
    }

    fn description(&self) -> &'static str {
        "Remove expired widget cache entries from memory and the database"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_minutes.saturating_mul(60)))
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let stats = ctx.cache.cleanup();
        let Some(persistent_deleted) = stats.persistent_deleted else {
            return Err(JobError::ExecutionFailed(
                "Failed to delete expired widget cache rows".to_string(),
            ));
        };

        info!(
            "Widget cache cleanup: {} memory entries evicted, {} rows deleted",
            stats.memory_evicted, persistent_deleted
        );
        Ok(())
    }
}
