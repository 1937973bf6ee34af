use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// Widget cache
// =============================================================================

/// A persisted, owner-scoped widget cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWidgetRow {
    pub widget_id: String,
    pub owner_id: String,
    pub data: JsonValue,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl CachedWidgetRow {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// Activity log
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    AppLaunch,
    WidgetInteraction,
    Search,
    /// Any other activity recorded by the platform; kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::AppLaunch => "app_launch",
            ActivityType::WidgetInteraction => "widget_interaction",
            ActivityType::Search => "search",
            ActivityType::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "app_launch" => ActivityType::AppLaunch,
            "widget_interaction" => ActivityType::WidgetInteraction,
            "search" => ActivityType::Search,
            other => ActivityType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLogEntry {
    pub user_id: String,
    pub activity_type: ActivityType,
    pub target_app: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Metrics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    DailyActiveUsers,
    AppLaunches,
    WidgetInteractions,
    SearchQueries,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::DailyActiveUsers => "daily_active_users",
            MetricType::AppLaunches => "app_launches",
            MetricType::WidgetInteractions => "widget_interactions",
            MetricType::SearchQueries => "search_queries",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily_active_users" => Some(MetricType::DailyActiveUsers),
            "app_launches" => Some(MetricType::AppLaunches),
            "widget_interactions" => Some(MetricType::WidgetInteractions),
            "search_queries" => Some(MetricType::SearchQueries),
            _ => None,
        }
    }
}

/// Optional breakdown dimensions of a metric. Together with the metric type and
/// date they form the metric's natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
}

impl MetricDimensions {
    pub fn for_application(application_name: impl Into<String>) -> Self {
        Self {
            application_name: Some(application_name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub metric_type: MetricType,
    pub metric_date: NaiveDate,
    pub value: i64,
    pub dimensions: MetricDimensions,
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Applications and health
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformApplication {
    pub app_name: String,
    pub display_name: String,
    pub health_check_url: Option<String>,
    pub is_active: bool,
}

/// An active application that has a health-check URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredApplication {
    pub app_name: String,
    pub display_name: String,
    pub health_check_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(HealthState::Healthy),
            "unhealthy" => Some(HealthState::Unhealthy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub application_name: String,
    pub health_check_url: String,
    pub status: HealthState,
    pub last_check_at: DateTime<Utc>,
    pub response_time_ms: Option<i64>,
    pub error_message: Option<String>,
}

// =============================================================================
// Users and notifications
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardUser {
    pub id: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

impl NotificationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationSeverity::Info => "info",
            NotificationSeverity::Warning => "warning",
            NotificationSeverity::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(NotificationSeverity::Info),
            "warning" => Some(NotificationSeverity::Warning),
            "error" => Some(NotificationSeverity::Error),
            _ => None,
        }
    }
}

/// Notification to be inserted for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
    pub category: String,
    pub created_at: i64,
}

// =============================================================================
// Background job bookkeeping
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobRunStatus::Running),
            "completed" => Some(JobRunStatus::Completed),
            "failed" => Some(JobRunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: i64,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    /// "schedule" or "manual"
    pub triggered_by: String,
}

#[derive(Debug, Clone)]
pub struct JobScheduleState {
    pub job_id: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}
