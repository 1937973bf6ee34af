mod models;
mod schema;
mod sqlite_dashboard_store;

pub use models::*;
pub use schema::DASHBOARD_VERSIONED_SCHEMAS;
pub use sqlite_dashboard_store::SqliteDashboardStore;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

/// Persistent tier of the widget cache.
pub trait WidgetCacheStore: Send + Sync {
    fn get_cached_widget(&self, widget_id: &str, owner_id: &str)
        -> Result<Option<CachedWidgetRow>>;
    /// Inserts or refreshes the row for `(widget_id, owner_id)`. A refresh
    /// replaces data and expiry and keeps the hit count.
    fn upsert_cached_widget(
        &self,
        widget_id: &str,
        owner_id: &str,
        data: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    fn record_cached_widget_hit(
        &self,
        widget_id: &str,
        owner_id: &str,
        accessed_at: DateTime<Utc>,
    ) -> Result<()>;
    /// Returns true if a row was deleted.
    fn delete_cached_widget(&self, widget_id: &str, owner_id: &str) -> Result<bool>;
    /// Deletes the rows of a widget across all owners.
    fn delete_cached_widgets_for_widget(&self, widget_id: &str) -> Result<usize>;
    /// Deletes rows whose expiry is at or before `now`.
    fn delete_expired_cached_widgets(&self, now: DateTime<Utc>) -> Result<usize>;
    fn count_cached_widgets(&self) -> Result<usize>;
}

/// Read access to the user activity log, plus retention.
pub trait ActivityLogStore: Send + Sync {
    fn record_activity(&self, entry: &ActivityLogEntry) -> Result<i64>;
    /// Distinct users with any activity in `[from, to)`.
    fn count_distinct_active_users(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<usize>;
    /// Launch counts per target application in `[from, to)`. Launches without
    /// a target are ignored.
    fn count_app_launches_by_app(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(String, usize)>>;
    fn count_activities(
        &self,
        activity_type: &ActivityType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize>;
    fn delete_activities_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

pub trait MetricsStore: Send + Sync {
    /// Last write wins on (type, date, dimensions).
    fn upsert_metric(&self, metric: &Metric) -> Result<()>;
    fn get_metrics(&self, metric_type: MetricType, date: NaiveDate) -> Result<Vec<Metric>>;
}

pub trait ApplicationStore: Send + Sync {
    fn upsert_application(&self, app: &PlatformApplication) -> Result<()>;
    /// Active applications that have a health-check URL, ordered by name.
    fn get_monitored_applications(&self) -> Result<Vec<MonitoredApplication>>;
    fn upsert_health_status(&self, status: &HealthStatus) -> Result<()>;
    fn get_health_status(&self, application_name: &str) -> Result<Option<HealthStatus>>;
    fn list_health_statuses(&self) -> Result<Vec<HealthStatus>>;
}

pub trait NotificationStore: Send + Sync {
    fn upsert_user(&self, user: &DashboardUser) -> Result<()>;
    fn get_active_user_ids_with_role(&self, role: &str) -> Result<Vec<String>>;
    /// Inserts all notifications in one transaction. Returns the new ids.
    fn insert_notifications(&self, notifications: &[NewNotification]) -> Result<Vec<String>>;
    /// Newest first.
    fn get_notifications_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>>;
}

pub trait JobStore: Send + Sync {
    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64>;
    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()>;
    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;
    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
    /// Marks runs left in `running` by a previous process as failed.
    fn mark_stale_jobs_failed(&self) -> Result<usize>;

    // Schedule state
    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>>;
    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()>;
}

/// Everything the scheduler and its jobs need from storage.
pub trait DashboardStore:
    WidgetCacheStore + ActivityLogStore + MetricsStore + ApplicationStore + NotificationStore + JobStore
{
}

impl<T> DashboardStore for T where
    T: WidgetCacheStore
        + ActivityLogStore
        + MetricsStore
        + ApplicationStore
        + NotificationStore
        + JobStore
{
}
