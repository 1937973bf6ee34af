//! The dashboard's background jobs.

pub mod activity_log_cleanup;
pub mod cache_cleanup;
pub mod daily_analytics;
pub mod health_check;
pub mod search_index;

pub use activity_log_cleanup::ActivityLogCleanupJob;
pub use cache_cleanup::CacheCleanupJob;
pub use daily_analytics::DailyAnalyticsJob;
pub use health_check::HealthCheckJob;
pub use search_index::SearchIndexUpdateJob;
