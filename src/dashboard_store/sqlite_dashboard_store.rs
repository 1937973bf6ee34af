use super::models::{
    ActivityLogEntry, ActivityType, CachedWidgetRow, DashboardUser, HealthState, HealthStatus,
    JobRun, JobRunStatus, JobScheduleState, Metric, MetricDimensions, MetricType,
    MonitoredApplication, NewNotification, Notification, NotificationSeverity,
    PlatformApplication,
};
use super::schema::DASHBOARD_VERSIONED_SCHEMAS;
use super::{
    ActivityLogStore, ApplicationStore, JobStore, MetricsStore, NotificationStore,
    WidgetCacheStore,
};
use crate::clock::{Clock, SystemClock};
use crate::sqlite_persistence::{read_schema_version, BASE_DB_VERSION};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const METRIC_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteDashboardStore {
    conn: Arc<Mutex<Connection>>,
    /// Source of the bookkeeping timestamps (`created_at`, `started_at`, ...).
    clock: Arc<dyn Clock>,
}

impl SqliteDashboardStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_clock(db_path, Arc::new(SystemClock))
    }

    pub fn with_clock<P: AsRef<Path>>(db_path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open dashboard database")?;
        let latest = DASHBOARD_VERSIONED_SCHEMAS
            .last()
            .context("No dashboard schema versions defined")?;

        if is_new_db {
            info!("Creating new dashboard database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let db_version = read_schema_version(&conn)?;
            if db_version < 1 {
                anyhow::bail!(
                    "Dashboard database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let version_index = DASHBOARD_VERSIONED_SCHEMAS
                .iter()
                .position(|s| s.version as i64 == db_version)
                .with_context(|| format!("Unknown dashboard database version {}", db_version))?;
            DASHBOARD_VERSIONED_SCHEMAS[version_index]
                .validate(&conn)
                .with_context(|| {
                    format!(
                        "Dashboard database schema validation failed for version {}",
                        db_version
                    )
                })?;

            if (db_version as usize) < latest.version {
                info!(
                    "Migrating dashboard database from version {} to {}",
                    db_version, latest.version
                );
                Self::migrate(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut current = from_version;
        for schema in DASHBOARD_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > from_version)
        {
            info!(
                "Running dashboard database migration from version {} to {}",
                current, schema.version
            );
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            current = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + current),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Dashboard database lock poisoned"))
    }

    fn to_timestamp(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp()
    }

    fn from_timestamp(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn empty_as_none(value: String) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn row_to_cached_widget(row: &rusqlite::Row) -> rusqlite::Result<CachedWidgetRow> {
        let data_str: String = row.get("data")?;
        let data = serde_json::from_str(&data_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        let hit_count: i64 = row.get("hit_count")?;
        let last_accessed_at: Option<i64> = row.get("last_accessed_at")?;

        Ok(CachedWidgetRow {
            widget_id: row.get("widget_id")?,
            owner_id: row.get("user_id")?,
            data,
            expires_at: Self::from_timestamp(row.get("expires_at")?),
            hit_count: hit_count.max(0) as u64,
            last_accessed_at: last_accessed_at.map(Self::from_timestamp),
        })
    }

    fn row_to_metric(row: &rusqlite::Row) -> rusqlite::Result<Metric> {
        let type_str: String = row.get("metric_type")?;
        let metric_type = MetricType::parse(&type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("unknown metric type '{}'", type_str).into(),
            )
        })?;
        let date_str: String = row.get("metric_date")?;
        let metric_date = NaiveDate::parse_from_str(&date_str, METRIC_DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

        Ok(Metric {
            metric_type,
            metric_date,
            value: row.get("metric_value")?,
            dimensions: MetricDimensions {
                user_role: Self::empty_as_none(row.get("user_role")?),
                location_name: Self::empty_as_none(row.get("location_name")?),
                application_name: Self::empty_as_none(row.get("application_name")?),
            },
            recorded_at: Self::from_timestamp(row.get("recorded_at")?),
        })
    }

    fn row_to_health_status(row: &rusqlite::Row) -> rusqlite::Result<HealthStatus> {
        let status_str: String = row.get("current_status")?;
        Ok(HealthStatus {
            application_name: row.get("application_name")?,
            health_check_url: row.get("health_check_url")?,
            status: HealthState::parse(&status_str).unwrap_or(HealthState::Unhealthy),
            last_check_at: Self::from_timestamp(row.get("last_check_at")?),
            response_time_ms: row.get("response_time_ms")?,
            error_message: row.get("error_message")?,
        })
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        let severity_str: String = row.get("type")?;
        Ok(Notification {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            message: row.get("message")?,
            severity: NotificationSeverity::parse(&severity_str)
                .unwrap_or(NotificationSeverity::Info),
            category: row.get("category")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status_str: String = row.get("status")?;
        let finished_at: Option<i64> = row.get("finished_at")?;

        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            started_at: Self::from_timestamp(row.get("started_at")?),
            finished_at: finished_at.map(Self::from_timestamp),
            status: JobRunStatus::parse(&status_str).unwrap_or(JobRunStatus::Failed),
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }

    fn row_to_schedule_state(row: &rusqlite::Row) -> rusqlite::Result<JobScheduleState> {
        let last_run_at: Option<i64> = row.get("last_run_at")?;
        Ok(JobScheduleState {
            job_id: row.get("job_id")?,
            next_run_at: Self::from_timestamp(row.get("next_run_at")?),
            last_run_at: last_run_at.map(Self::from_timestamp),
        })
    }
}

impl WidgetCacheStore for SqliteDashboardStore {
    fn get_cached_widget(
        &self,
        widget_id: &str,
        owner_id: &str,
    ) -> Result<Option<CachedWidgetRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT widget_id, user_id, data, expires_at, hit_count, last_accessed_at
                 FROM widget_data_cache WHERE widget_id = ?1 AND user_id = ?2",
                params![widget_id, owner_id],
                Self::row_to_cached_widget,
            )
            .optional()?;
        Ok(row)
    }

    fn upsert_cached_widget(
        &self,
        widget_id: &str,
        owner_id: &str,
        data: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let data = serde_json::to_string(data).context("Failed to serialize widget data")?;
        let now = Self::to_timestamp(&self.clock.now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO widget_data_cache
                (widget_id, user_id, data, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(widget_id, user_id) DO UPDATE SET
                data = excluded.data,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![
                widget_id,
                owner_id,
                data,
                Self::to_timestamp(&expires_at),
                now
            ],
        )?;
        Ok(())
    }

    fn record_cached_widget_hit(
        &self,
        widget_id: &str,
        owner_id: &str,
        accessed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE widget_data_cache
             SET hit_count = hit_count + 1, last_accessed_at = ?3
             WHERE widget_id = ?1 AND user_id = ?2",
            params![widget_id, owner_id, Self::to_timestamp(&accessed_at)],
        )?;
        Ok(())
    }

    fn delete_cached_widget(&self, widget_id: &str, owner_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM widget_data_cache WHERE widget_id = ?1 AND user_id = ?2",
            params![widget_id, owner_id],
        )?;
        Ok(deleted > 0)
    }

    fn delete_cached_widgets_for_widget(&self, widget_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM widget_data_cache WHERE widget_id = ?1",
            params![widget_id],
        )?;
        Ok(deleted)
    }

    fn delete_expired_cached_widgets(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM widget_data_cache WHERE expires_at <= ?1",
            params![Self::to_timestamp(&now)],
        )?;
        Ok(deleted)
    }

    fn count_cached_widgets(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM widget_data_cache", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

impl ActivityLogStore for SqliteDashboardStore {
    fn record_activity(&self, entry: &ActivityLogEntry) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_activity_log (user_id, activity_type, target_app, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.user_id,
                entry.activity_type.as_str(),
                entry.target_app,
                Self::to_timestamp(&entry.created_at)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_distinct_active_users(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM user_activity_log
             WHERE created_at >= ?1 AND created_at < ?2",
            params![Self::to_timestamp(&from), Self::to_timestamp(&to)],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_app_launches_by_app(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(String, usize)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_app, COUNT(*) FROM user_activity_log
             WHERE activity_type = ?1
               AND target_app IS NOT NULL AND target_app != ''
               AND created_at >= ?2 AND created_at < ?3
             GROUP BY target_app
             ORDER BY target_app",
        )?;
        let counts = stmt
            .query_map(
                params![
                    ActivityType::AppLaunch.as_str(),
                    Self::to_timestamp(&from),
                    Self::to_timestamp(&to)
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    fn count_activities(
        &self,
        activity_type: &ActivityType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_activity_log
             WHERE activity_type = ?1 AND created_at >= ?2 AND created_at < ?3",
            params![
                activity_type.as_str(),
                Self::to_timestamp(&from),
                Self::to_timestamp(&to)
            ],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_activities_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM user_activity_log WHERE created_at < ?1",
            params![Self::to_timestamp(&cutoff)],
        )?;
        Ok(deleted)
    }
}

impl MetricsStore for SqliteDashboardStore {
    fn upsert_metric(&self, metric: &Metric) -> Result<()> {
        let metadata =
            serde_json::to_string(&metric.dimensions).context("Failed to serialize metadata")?;
        let dims = &metric.dimensions;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO dashboard_metrics
                (metric_type, metric_date, metric_value, user_role, location_name,
                 application_name, metric_metadata, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(metric_type, metric_date, user_role, location_name, application_name)
             DO UPDATE SET
                metric_value = excluded.metric_value,
                metric_metadata = excluded.metric_metadata,
                recorded_at = excluded.recorded_at",
            params![
                metric.metric_type.as_str(),
                metric.metric_date.format(METRIC_DATE_FORMAT).to_string(),
                metric.value,
                dims.user_role.as_deref().unwrap_or(""),
                dims.location_name.as_deref().unwrap_or(""),
                dims.application_name.as_deref().unwrap_or(""),
                metadata,
                Self::to_timestamp(&metric.recorded_at)
            ],
        )?;
        Ok(())
    }

    fn get_metrics(&self, metric_type: MetricType, date: NaiveDate) -> Result<Vec<Metric>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT metric_type, metric_date, metric_value, user_role, location_name,
                    application_name, recorded_at
             FROM dashboard_metrics
             WHERE metric_type = ?1 AND metric_date = ?2
             ORDER BY user_role, location_name, application_name",
        )?;
        let metrics = stmt
            .query_map(
                params![
                    metric_type.as_str(),
                    date.format(METRIC_DATE_FORMAT).to_string()
                ],
                Self::row_to_metric,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(metrics)
    }
}

impl ApplicationStore for SqliteDashboardStore {
    fn upsert_application(&self, app: &PlatformApplication) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO platform_applications (app_name, display_name, health_check_url, is_active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(app_name) DO UPDATE SET
                display_name = excluded.display_name,
                health_check_url = excluded.health_check_url,
                is_active = excluded.is_active",
            params![
                app.app_name,
                app.display_name,
                app.health_check_url,
                app.is_active
            ],
        )?;
        Ok(())
    }

    fn get_monitored_applications(&self) -> Result<Vec<MonitoredApplication>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT app_name, display_name, health_check_url FROM platform_applications
             WHERE is_active = 1 AND health_check_url IS NOT NULL AND health_check_url != ''
             ORDER BY app_name",
        )?;
        let apps = stmt
            .query_map([], |row| {
                Ok(MonitoredApplication {
                    app_name: row.get(0)?,
                    display_name: row.get(1)?,
                    health_check_url: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(apps)
    }

    fn upsert_health_status(&self, status: &HealthStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO application_health_status
                (application_name, health_check_url, current_status, last_check_at,
                 response_time_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(application_name) DO UPDATE SET
                health_check_url = excluded.health_check_url,
                current_status = excluded.current_status,
                last_check_at = excluded.last_check_at,
                response_time_ms = excluded.response_time_ms,
                error_message = excluded.error_message",
            params![
                status.application_name,
                status.health_check_url,
                status.status.as_str(),
                Self::to_timestamp(&status.last_check_at),
                status.response_time_ms,
                status.error_message
            ],
        )?;
        Ok(())
    }

    fn get_health_status(&self, application_name: &str) -> Result<Option<HealthStatus>> {
        let conn = self.conn()?;
        let status = conn
            .query_row(
                "SELECT application_name, health_check_url, current_status, last_check_at,
                        response_time_ms, error_message
                 FROM application_health_status WHERE application_name = ?1",
                params![application_name],
                Self::row_to_health_status,
            )
            .optional()?;
        Ok(status)
    }

    fn list_health_statuses(&self) -> Result<Vec<HealthStatus>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT application_name, health_check_url, current_status, last_check_at,
                    response_time_ms, error_message
             FROM application_health_status ORDER BY application_name",
        )?;
        let statuses = stmt
            .query_map([], Self::row_to_health_status)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(statuses)
    }
}

impl NotificationStore for SqliteDashboardStore {
    fn upsert_user(&self, user: &DashboardUser) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, role, is_active) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET role = excluded.role, is_active = excluded.is_active",
            params![user.id, user.role, user.is_active],
        )?;
        Ok(())
    }

    fn get_active_user_ids_with_role(&self, role: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id FROM users WHERE role = ?1 AND is_active = 1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![role], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn insert_notifications(&self, notifications: &[NewNotification]) -> Result<Vec<String>> {
        let now = Self::to_timestamp(&self.clock.now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(notifications.len());
        for notification in notifications {
            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO notifications (id, user_id, title, message, type, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    notification.user_id,
                    notification.title,
                    notification.message,
                    notification.severity.as_str(),
                    notification.category,
                    now
                ],
            )?;
            ids.push(id);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn get_notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, message, type, category, created_at
             FROM notifications WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let notifications = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }
}

impl JobStore for SqliteDashboardStore {
    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO job_runs (job_id, started_at, status, triggered_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                Self::to_timestamp(&self.clock.now()),
                JobRunStatus::Running.as_str(),
                triggered_by
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE job_runs SET finished_at = ?1, status = ?2, error_message = ?3 WHERE id = ?4",
            params![
                Self::to_timestamp(&self.clock.now()),
                status.as_str(),
                error_message,
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
             FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC, id DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(params![job_id, limit as i64], Self::row_to_job_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
                 FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![job_id],
                Self::row_to_job_run,
            )
            .optional()?;
        Ok(run)
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                JobRunStatus::Failed.as_str(),
                Self::to_timestamp(&self.clock.now()),
                "Job was interrupted (process restart)",
                JobRunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }

    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT job_id, next_run_at, last_run_at FROM job_schedules WHERE job_id = ?1",
                params![job_id],
                Self::row_to_schedule_state,
            )
            .optional()?;
        Ok(state)
    }

    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO job_schedules (job_id, next_run_at, last_run_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET next_run_at = ?2, last_run_at = ?3",
            params![
                state.job_id,
                Self::to_timestamp(&state.next_run_at),
                state.last_run_at.as_ref().map(Self::to_timestamp)
            ],
        )?;
        Ok(())
    }
}
