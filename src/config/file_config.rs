use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub widget_cache: Option<WidgetCacheConfig>,
    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WidgetCacheConfig {
    /// Per-widget TTL in seconds, replacing the built-in value.
    pub ttl_overrides: HashMap<String, u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub search_index: Option<IntervalJobConfig>,
    pub cache_cleanup: Option<IntervalJobConfig>,
    pub health_check: Option<HealthCheckJobConfig>,
    pub daily_analytics: Option<DailyJobConfig>,
    pub activity_log_cleanup: Option<ActivityLogCleanupJobConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct IntervalJobConfig {
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HealthCheckJobConfig {
    pub interval_minutes: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub admin_role: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DailyJobConfig {
    /// Local wall-clock time, `HH:MM`.
    pub run_at: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ActivityLogCleanupJobConfig {
    pub run_at: Option<String>,
    pub retention_days: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
