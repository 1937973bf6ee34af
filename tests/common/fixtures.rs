//! A fully wired dashboard backed by a temporary database

use super::constants::*;
use chrono::{DateTime, Utc};
use ganger_dashboard_jobs::background_jobs::jobs::{
    ActivityLogCleanupJob, CacheCleanupJob, DailyAnalyticsJob, HealthCheckJob,
    SearchIndexUpdateJob,
};
use ganger_dashboard_jobs::background_jobs::{JobContext, JobScheduler};
use ganger_dashboard_jobs::config::BackgroundJobsSettings;
use ganger_dashboard_jobs::dashboard_store::{
    ActivityLogEntry, ActivityLogStore, ActivityType, ApplicationStore, DashboardUser,
    NotificationStore, PlatformApplication, SqliteDashboardStore,
};
use ganger_dashboard_jobs::search::NoOpSearchIndexer;
use ganger_dashboard_jobs::{ManualClock, WidgetCache, WidgetTtlTable};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestDashboard {
    pub store: Arc<SqliteDashboardStore>,
    pub cache: Arc<WidgetCache>,
    pub clock: Arc<ManualClock>,
    pub scheduler: JobScheduler,
    pub cancellation_token: CancellationToken,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDashboard {
    /// Dashboard with the five production jobs registered and three admins
    /// (two active) plus one staff user. The scheduler is not started.
    pub async fn new() -> Self {
        Self::with_settings(BackgroundJobsSettings::default()).await
    }

    pub async fn with_settings(settings: BackgroundJobsSettings) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("dashboard.db");
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(SqliteDashboardStore::with_clock(&db_path, clock.clone()).unwrap());
        let cache = Arc::new(WidgetCache::new(
            store.clone(),
            clock.clone(),
            WidgetTtlTable::new(),
        ));
        let cancellation_token = CancellationToken::new();
        let ctx = JobContext::new(
            cancellation_token.clone(),
            store.clone(),
            cache.clone(),
            clock.clone(),
        );

        let scheduler = JobScheduler::new(ctx);
        scheduler
            .register_job(Arc::new(SearchIndexUpdateJob::from_settings(
                &settings.search_index,
                Arc::new(NoOpSearchIndexer),
            )))
            .await;
        scheduler
            .register_job(Arc::new(CacheCleanupJob::from_settings(
                &settings.cache_cleanup,
            )))
            .await;
        scheduler
            .register_job(Arc::new(
                HealthCheckJob::from_settings(&settings.health_check).unwrap(),
            ))
            .await;
        scheduler
            .register_job(Arc::new(DailyAnalyticsJob::from_settings(
                &settings.daily_analytics,
            )))
            .await;
        scheduler
            .register_job(Arc::new(ActivityLogCleanupJob::from_settings(
                &settings.activity_log_cleanup,
            )))
            .await;

        for (id, role, is_active) in [
            (ADMIN_1_ID, ADMIN_ROLE, true),
            (ADMIN_2_ID, ADMIN_ROLE, true),
            (INACTIVE_ADMIN_ID, ADMIN_ROLE, false),
            (STAFF_ID, "staff", true),
        ] {
            store
                .upsert_user(&DashboardUser {
                    id: id.to_string(),
                    role: role.to_string(),
                    is_active,
                })
                .unwrap();
        }

        Self {
            store,
            cache,
            clock,
            scheduler,
            cancellation_token,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    pub fn add_application(&self, name: &str, health_check_url: Option<String>) {
        self.store
            .upsert_application(&PlatformApplication {
                app_name: name.to_string(),
                display_name: display_name(name),
                health_check_url,
                is_active: true,
            })
            .unwrap();
    }

    pub fn record_activity(
        &self,
        user_id: &str,
        activity_type: ActivityType,
        target_app: Option<&str>,
        at: DateTime<Utc>,
    ) {
        self.store
            .record_activity(&ActivityLogEntry {
                user_id: user_id.to_string(),
                activity_type,
                target_app: target_app.map(str::to_string),
                created_at: at,
            })
            .unwrap();
    }
}

/// Display name used for fixture applications, e.g. "Inventory".
pub fn display_name(app_name: &str) -> String {
    let mut chars = app_name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
