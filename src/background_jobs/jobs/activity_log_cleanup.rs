//! Activity log retention.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::config::ActivityLogCleanupJobSettings;
use crate::dashboard_store::ActivityLogStore;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use tracing::info;

pub struct ActivityLogCleanupJob {
    run_at: NaiveTime,
    retention_days: u64,
}

impl ActivityLogCleanupJob {
    pub const ID: &'static str = "activity_log_cleanup";

    pub fn from_settings(settings: &ActivityLogCleanupJobSettings) -> Self {
        Self {
            run_at: settings.run_at,
            retention_days: settings.retention_days,
        }
    }
}

/// Start of the retention window. A window reaching past the earliest
/// representable time keeps everything.
fn retention_cutoff(now: DateTime<Utc>, retention_days: u64) -> DateTime<Utc> {
    i64::try_from(retention_days)
        .ok()
        .and_then(chrono::Duration::try_days)
        .and_then(|retention| now.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl BackgroundJob for ActivityLogCleanupJob {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Activity Log Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete user activity older than the retention window"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::DailyAt(self.run_at)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let cutoff = retention_cutoff(ctx.clock.now(), self.retention_days);
        let deleted = ctx
            .store
            .delete_activities_before(cutoff)
            .context("Failed to delete old activity log entries")?;

        info!(
            "Deleted {} activity log entries older than {} days",
            deleted, self.retention_days
        );
        Ok(())
    }
}
