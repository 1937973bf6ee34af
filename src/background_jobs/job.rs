use super::context::JobContext;
use async_trait::async_trait;
use chrono::NaiveTime;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Schedule for when a job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSchedule {
    /// Run at fixed intervals
    Interval(Duration),
    /// Run once a day at a local wall-clock time
    DailyAt(NaiveTime),
}

/// Errors that can occur during job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", e))
    }
}

/// Trait for background jobs.
///
/// Every execution runs in its own tokio task. Long-running jobs should check
/// `ctx.is_cancelled()` between units of work and return
/// `JobError::Cancelled` once it is set.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Execute the job with optional parameters.
    ///
    /// Manual triggers may pass JSON parameters. The default implementation
    /// ignores them and delegates to `execute()`.
    async fn execute_with_params(
        &self,
        ctx: &JobContext,
        _params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        self.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display() {
        assert_eq!(JobError::NotFound.to_string(), "Job not found");
        assert_eq!(
            JobError::ExecutionFailed("boom".into()).to_string(),
            "Execution failed: boom"
        );
    }

    #[test]
    fn test_job_error_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("disk full").context("Failed to write metric");
        let job_err = JobError::from(err);
        assert_eq!(
            job_err.to_string(),
            "Execution failed: Failed to write metric: disk full"
        );
    }
}
