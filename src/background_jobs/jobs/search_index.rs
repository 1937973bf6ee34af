//! Periodic search index refresh.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::config::SearchIndexJobSettings;
use crate::search::SearchIndexer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct SearchIndexUpdateJob {
    interval_minutes: u64,
    indexer: Arc<dyn SearchIndexer>,
}

impl SearchIndexUpdateJob {
    pub const ID: &'static str = "search_index_update";

    pub fn from_settings(
        settings: &SearchIndexJobSettings,
        indexer: Arc<dyn SearchIndexer>,
    ) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
            indexer,
        }
    }
}

#[async_trait]
impl BackgroundJob for SearchIndexUpdateJob {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Search Index Update"
    }

    fn description(&self) -> &'static str {
        "Refresh the dashboard search index"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_minutes.saturating_mul(60)))
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let stats = self.indexer.update_index().await?;
        info!(
            "Search index '{}' updated, {} documents indexed",
            self.indexer.name(),
            stats.documents_indexed
        );
        Ok(())
    }
}
