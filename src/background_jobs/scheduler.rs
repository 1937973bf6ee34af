use super::context::JobContext;
use super::job::{BackgroundJob, JobError};
use super::jobs::{
    ActivityLogCleanupJob, CacheCleanupJob, DailyAnalyticsJob, HealthCheckJob,
    SearchIndexUpdateJob,
};
use super::status::{JobInfo, JobRunInfo, SchedulerStatus};
use crate::dashboard_store::{DashboardStore, JobRunStatus, JobScheduleState, JobStore};
use crate::metrics;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) const TRIGGER_SCHEDULE: &str = "schedule";
const TRIGGER_MANUAL: &str = "manual";

/// State shared between the scheduler, its timer tasks and running executions.
struct SchedulerInner {
    jobs: RwLock<HashMap<String, Arc<dyn BackgroundJob>>>,
    /// Overlap guard: ids of jobs with an execution in flight.
    running_jobs: Mutex<HashSet<String>>,
    store: Arc<dyn DashboardStore>,
    job_context: JobContext,
    stale_runs_checked: AtomicBool,
}

/// Timers armed by the last `start()`.
struct ActiveTimers {
    stop_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Owns one recurring timer per registered job, plus manual triggers and
/// status introspection.
///
/// `stop()` only disarms the timers. Executions already in flight keep running
/// until they finish or observe the job context's cancellation token.
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
    timers: tokio::sync::Mutex<Option<ActiveTimers>>,
}

impl JobScheduler {
    pub fn new(job_context: JobContext) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: RwLock::new(HashMap::new()),
                running_jobs: Mutex::new(HashSet::new()),
                store: Arc::clone(&job_context.store),
                job_context,
                stale_runs_checked: AtomicBool::new(false),
            }),
            timers: tokio::sync::Mutex::new(None),
        }
    }

    /// Register a job with the scheduler. Jobs registered while the scheduler
    /// is running get a timer on the next `start()`.
    pub async fn register_job(&self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        self.inner.jobs.write().await.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.inner.jobs.read().await.len()
    }

    /// Arms one timer per registered job. No-op when already running.
    pub async fn start(&self) {
        let mut timers = self.timers.lock().await;
        if timers.is_some() {
            debug!("Job scheduler already running");
            return;
        }

        // Runs left "running" by a previous process can never finish
        if !self.inner.stale_runs_checked.swap(true, Ordering::SeqCst) {
            match self.inner.store.mark_stale_jobs_failed() {
                Ok(count) if count > 0 => {
                    info!("Marked {} stale jobs as failed from previous run", count);
                }
                Ok(_) => {}
                Err(e) => error!("Failed to mark stale jobs: {:#}", e),
            }
        }

        let jobs: Vec<Arc<dyn BackgroundJob>> =
            self.inner.jobs.read().await.values().cloned().collect();
        let stop_token = CancellationToken::new();
        let handles = jobs
            .into_iter()
            .map(|job| {
                tokio::spawn(run_timer(
                    Arc::clone(&self.inner),
                    job,
                    stop_token.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!("Job scheduler started with {} timers", handles.len());
        *timers = Some(ActiveTimers {
            stop_token,
            handles,
        });
    }

    /// Disarms all timers. No-op when already stopped.
    pub async fn stop(&self) {
        let Some(active) = self.timers.lock().await.take() else {
            debug!("Job scheduler already stopped");
            return;
        };

        active.stop_token.cancel();
        for handle in active.handles {
            if let Err(e) = handle.await {
                warn!("Job timer task ended abnormally: {}", e);
            }
        }
        info!("Job scheduler stopped");
    }

    /// Stops the timers, cancels running executions and waits up to `grace`
    /// for them to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.stop().await;
        self.inner.job_context.cancellation_token.cancel();

        let deadline = Instant::now() + grace;
        loop {
            let running = self.inner.running().len();
            if running == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!("Shutting down with {} jobs still running", running);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let timers = self.timers.lock().await;
        SchedulerStatus {
            is_running: timers.is_some(),
            active_timer_count: timers.as_ref().map_or(0, |t| t.handles.len()),
        }
    }

    /// Runs a job immediately and waits for it to finish.
    pub async fn run_job_now(
        &self,
        job_id: &str,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let job = self
            .inner
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or(JobError::NotFound)?;

        let handle = self.inner.spawn_execution(job, TRIGGER_MANUAL, params)?;
        handle
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("Task panic: {}", e)))?
    }

    /// Aggregates usage metrics for `date`, or for yesterday when `None`.
    pub async fn run_analytics_now(&self, date: Option<NaiveDate>) -> Result<(), JobError> {
        let params =
            date.map(|d| serde_json::json!({ "date": d.format("%Y-%m-%d").to_string() }));
        self.run_job_now(DailyAnalyticsJob::ID, params).await
    }

    pub async fn run_health_check_now(&self) -> Result<(), JobError> {
        self.run_job_now(HealthCheckJob::ID, None).await
    }

    pub async fn run_cache_cleanup_now(&self) -> Result<(), JobError> {
        self.run_job_now(CacheCleanupJob::ID, None).await
    }

    pub async fn run_search_index_update_now(&self) -> Result<(), JobError> {
        self.run_job_now(SearchIndexUpdateJob::ID, None).await
    }

    pub async fn run_activity_log_cleanup_now(&self) -> Result<(), JobError> {
        self.run_job_now(ActivityLogCleanupJob::ID, None).await
    }

    pub fn is_job_running(&self, job_id: &str) -> bool {
        self.inner.running().contains(job_id)
    }

    /// Get information about all registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let jobs = self.inner.jobs.read().await;
        let mut infos = jobs
            .values()
            .map(|job| self.job_info(job.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let jobs = self.inner.jobs.read().await;
        jobs.get(job_id)
            .map(|job| self.job_info(job.as_ref()))
            .transpose()
    }

    /// Most recent runs of a job, newest first.
    pub fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRunInfo>> {
        Ok(self
            .inner
            .store
            .get_job_history(job_id, limit)?
            .into_iter()
            .map(JobRunInfo::from)
            .collect())
    }

    fn job_info(&self, job: &dyn BackgroundJob) -> Result<JobInfo> {
        let job_id = job.id();
        let last_run = self.inner.store.get_last_run(job_id)?.map(JobRunInfo::from);
        let next_run_at = self
            .inner
            .store
            .get_schedule_state(job_id)?
            .map(|s| s.next_run_at.to_rfc3339());

        Ok(JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            schedule: job.schedule().into(),
            is_running: self.is_job_running(job_id),
            last_run,
            next_run_at,
        })
    }
}

impl SchedulerInner {
    fn running(&self) -> MutexGuard<'_, HashSet<String>> {
        self.running_jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the overlap guard and spawns the execution. The returned handle
    /// resolves to the job's result.
    fn spawn_execution(
        self: &Arc<Self>,
        job: Arc<dyn BackgroundJob>,
        triggered_by: &'static str,
        params: Option<JsonValue>,
    ) -> Result<JoinHandle<Result<(), JobError>>, JobError> {
        let job_id = job.id();
        if !self.running().insert(job_id.to_string()) {
            return Err(JobError::AlreadyRunning);
        }

        let run_id = match self.store.record_job_start(job_id, triggered_by) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to record job start for {}: {:#}", job_id, e);
                None
            }
        };
        info!(
            "Starting job: {} (run_id: {:?}, triggered_by: {})",
            job_id, run_id, triggered_by
        );
        metrics::set_background_job_running(job_id, true);

        let ctx = self.job_context.child();
        let inner = Arc::clone(self);

        Ok(tokio::spawn(async move {
            let start_time = Instant::now();
            let exec_job = Arc::clone(&job);
            // Nested task so a panic surfaces as a JoinError instead of
            // unwinding past the bookkeeping below
            let result =
                tokio::spawn(async move { exec_job.execute_with_params(&ctx, params).await })
                    .await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label, outcome) = match result {
                Ok(Ok(())) => {
                    info!("Job {} completed successfully in {:?}", job_id, elapsed);
                    (JobRunStatus::Completed, None, "success", Ok(()))
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id, elapsed);
                    (
                        JobRunStatus::Failed,
                        Some("Cancelled".to_string()),
                        "cancelled",
                        Err(JobError::Cancelled),
                    )
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), "failed", Err(e))
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
                    let msg = format!("Task panic: {}", e);
                    (
                        JobRunStatus::Failed,
                        Some(msg.clone()),
                        "panic",
                        Err(JobError::ExecutionFailed(msg)),
                    )
                }
            };

            metrics::record_background_job_execution(job_id, status_label, elapsed);
            metrics::set_background_job_running(job_id, false);

            if let Some(run_id) = run_id {
                if let Err(e) = inner.store.record_job_finish(run_id, status, error_msg) {
                    error!("Failed to record job finish for {}: {:#}", job_id, e);
                }
            }

            inner.running().remove(job_id);
            outcome
        }))
    }

    /// Next run time when a timer is armed: the persisted one if present
    /// (a past time fires immediately), capped by the schedule.
    fn initial_next_run(&self, job: &dyn BackgroundJob, now: DateTime<Utc>) -> DateTime<Utc> {
        let job_id = job.id();
        let computed = job.schedule().next_run_after(now);
        match self.store.get_schedule_state(job_id) {
            Ok(Some(state)) => {
                if state.next_run_at <= now {
                    info!(
                        "Job {} missed its run at {}, running now",
                        job_id, state.next_run_at
                    );
                }
                state.next_run_at.min(computed)
            }
            Ok(None) => {
                self.persist_schedule(job_id, computed, None);
                computed
            }
            Err(e) => {
                warn!("Failed to read schedule state for {}: {:#}", job_id, e);
                computed
            }
        }
    }

    fn persist_schedule(
        &self,
        job_id: &str,
        next_run_at: DateTime<Utc>,
        last_run_at: Option<DateTime<Utc>>,
    ) {
        let state = JobScheduleState {
            job_id: job_id.to_string(),
            next_run_at,
            last_run_at,
        };
        if let Err(e) = self.store.update_schedule_state(&state) {
            warn!("Failed to persist schedule state for {}: {:#}", job_id, e);
        }
    }
}

/// Sleeps until the job's next run time, fires it and re-arms, until `stop`
/// is cancelled.
async fn run_timer(
    inner: Arc<SchedulerInner>,
    job: Arc<dyn BackgroundJob>,
    stop: CancellationToken,
) {
    let job_id = job.id();
    let clock = Arc::clone(&inner.job_context.clock);
    let mut next_run = inner.initial_next_run(job.as_ref(), clock.now());
    debug!("Timer for {} armed, next run at {}", job_id, next_run);

    loop {
        let wait = (next_run - clock.now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let fired_at = clock.now();
        match inner.spawn_execution(Arc::clone(&job), TRIGGER_SCHEDULE, None) {
            Ok(_) => {}
            Err(JobError::AlreadyRunning) => {
                info!("Skipping scheduled run of {}: previous run still in progress", job_id);
            }
            Err(e) => warn!("Failed to start scheduled run of {}: {}", job_id, e),
        }

        // A wake-up a hair before the target must not schedule the same slot again
        next_run = job.schedule().next_run_after(fired_at.max(next_run));
        inner.persist_schedule(job_id, next_run, Some(fired_at));
        debug!("Next run of {} at {}", job_id, next_run);
    }

    debug!("Timer for {} disarmed", job_id);
}
