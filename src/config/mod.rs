mod file_config;

pub use file_config::{
    ActivityLogCleanupJobConfig, BackgroundJobsConfig, DailyJobConfig, FileConfig,
    HealthCheckJobConfig, IntervalJobConfig, WidgetCacheConfig,
};

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::path::PathBuf;

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const MAX_RETENTION_DAYS: u64 = 3650;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub metrics_port: u16,

    pub widget_cache: WidgetCacheSettings,
    pub background_jobs: BackgroundJobsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let widget_cache = WidgetCacheSettings {
            ttl_overrides: file.widget_cache.unwrap_or_default().ttl_overrides,
        };
        let zero_ttl = widget_cache.ttl_overrides.iter().find(|(_, ttl)| **ttl == 0);
        if let Some((widget, _)) = zero_ttl {
            bail!("TTL override for widget '{}' must be greater than zero", widget);
        }

        let background_jobs =
            BackgroundJobsSettings::resolve(file.background_jobs.unwrap_or_default())?;

        Ok(Self {
            db_dir,
            metrics_port,
            widget_cache,
            background_jobs,
        })
    }

    pub fn dashboard_db_path(&self) -> PathBuf {
        self.db_dir.join("dashboard.db")
    }
}

#[derive(Debug, Clone, Default)]
pub struct WidgetCacheSettings {
    pub ttl_overrides: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundJobsSettings {
    pub search_index: SearchIndexJobSettings,
    pub cache_cleanup: CacheCleanupJobSettings,
    pub health_check: HealthCheckJobSettings,
    pub daily_analytics: DailyAnalyticsJobSettings,
    pub activity_log_cleanup: ActivityLogCleanupJobSettings,
}

impl BackgroundJobsSettings {
    fn resolve(file: BackgroundJobsConfig) -> Result<Self> {
        let defaults = Self::default();

        let search_index = SearchIndexJobSettings {
            interval_minutes: bounded(
                "background_jobs.search_index.interval_minutes",
                file.search_index.and_then(|c| c.interval_minutes),
                defaults.search_index.interval_minutes,
                MAX_INTERVAL_MINUTES,
            )?,
        };

        let cache_cleanup = CacheCleanupJobSettings {
            interval_minutes: bounded(
                "background_jobs.cache_cleanup.interval_minutes",
                file.cache_cleanup.and_then(|c| c.interval_minutes),
                defaults.cache_cleanup.interval_minutes,
                MAX_INTERVAL_MINUTES,
            )?,
        };

        let hc_file = file.health_check.unwrap_or_default();
        let health_check = HealthCheckJobSettings {
            interval_minutes: bounded(
                "background_jobs.health_check.interval_minutes",
                hc_file.interval_minutes,
                defaults.health_check.interval_minutes,
                MAX_INTERVAL_MINUTES,
            )?,
            timeout_secs: bounded(
                "background_jobs.health_check.timeout_secs",
                hc_file.timeout_secs,
                defaults.health_check.timeout_secs,
                MAX_TIMEOUT_SECS,
            )?,
            admin_role: hc_file
                .admin_role
                .unwrap_or(defaults.health_check.admin_role),
        };

        let daily_analytics = DailyAnalyticsJobSettings {
            run_at: run_at(
                "background_jobs.daily_analytics.run_at",
                file.daily_analytics.and_then(|c| c.run_at),
                defaults.daily_analytics.run_at,
            )?,
        };

        let cleanup_file = file.activity_log_cleanup.unwrap_or_default();
        let activity_log_cleanup = ActivityLogCleanupJobSettings {
            run_at: run_at(
                "background_jobs.activity_log_cleanup.run_at",
                cleanup_file.run_at,
                defaults.activity_log_cleanup.run_at,
            )?,
            retention_days: bounded(
                "background_jobs.activity_log_cleanup.retention_days",
                cleanup_file.retention_days,
                defaults.activity_log_cleanup.retention_days,
                MAX_RETENTION_DAYS,
            )?,
        };

        Ok(Self {
            search_index,
            cache_cleanup,
            health_check,
            daily_analytics,
            activity_log_cleanup,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchIndexJobSettings {
    pub interval_minutes: u64,
}

impl Default for SearchIndexJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheCleanupJobSettings {
    pub interval_minutes: u64,
}

impl Default for CacheCleanupJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheckJobSettings {
    pub interval_minutes: u64,
    pub timeout_secs: u64,
    /// Users with this role receive health alerts.
    pub admin_role: String,
}

impl Default for HealthCheckJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            timeout_secs: 10,
            admin_role: "superadmin".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyAnalyticsJobSettings {
    pub run_at: NaiveTime,
}

impl Default for DailyAnalyticsJobSettings {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLogCleanupJobSettings {
    pub run_at: NaiveTime,
    pub retention_days: u64,
}

impl Default for ActivityLogCleanupJobSettings {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default(),
            retention_days: 90,
        }
    }
}

fn bounded(name: &str, value: Option<u64>, default: u64, max: u64) -> Result<u64> {
    match value {
        Some(0) => bail!("{} must be greater than zero", name),
        Some(v) if v > max => bail!("{} must be at most {}, got {}", name, max, v),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

/// Parses an `HH:MM` wall-clock time.
fn parse_run_at(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .with_context(|| format!("Invalid time '{}', expected HH:MM", s))
}

fn run_at(name: &str, value: Option<String>, default: NaiveTime) -> Result<NaiveTime> {
    match value {
        Some(s) => parse_run_at(&s).with_context(|| format!("Invalid {}", name)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn cli_for(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            metrics_port: 9092,
        }
    }

    #[test]
    fn test_parse_run_at() {
        assert_eq!(
            parse_run_at("02:30").unwrap(),
            NaiveTime::from_hms_opt(2, 30, 0).unwrap()
        );
        assert!(parse_run_at("25:00").is_err());
        assert!(parse_run_at("2am").is_err());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let config = AppConfig::resolve(&cli_for(&temp_dir), None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.metrics_port, 9092);
        assert!(config.widget_cache.ttl_overrides.is_empty());

        let jobs = &config.background_jobs;
        assert_eq!(jobs.search_index.interval_minutes, 60);
        assert_eq!(jobs.cache_cleanup.interval_minutes, 30);
        assert_eq!(jobs.health_check.interval_minutes, 5);
        assert_eq!(jobs.health_check.timeout_secs, 10);
        assert_eq!(jobs.health_check.admin_role, "superadmin");
        assert_eq!(
            jobs.daily_analytics.run_at,
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            jobs.activity_log_cleanup.run_at,
            NaiveTime::from_hms_opt(2, 0, 0).unwrap()
        );
        assert_eq!(jobs.activity_log_cleanup.retention_days, 90);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            metrics_port: 9092,
        };
        let toml = format!(
            r#"
db_dir = "{}"
metrics_port = 9100

[widget_cache]
ttl_overrides = {{ team_activity = 120 }}

[background_jobs.health_check]
timeout_secs = 3
admin_role = "manager"

[background_jobs.daily_analytics]
run_at = "01:15"

[background_jobs.activity_log_cleanup]
retention_days = 30
"#,
            temp_dir.path().display()
        );
        let file_config: FileConfig = toml::from_str(&toml).unwrap();

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(
            config.widget_cache.ttl_overrides.get("team_activity"),
            Some(&120)
        );
        let jobs = &config.background_jobs;
        assert_eq!(jobs.health_check.timeout_secs, 3);
        assert_eq!(jobs.health_check.admin_role, "manager");
        // Unset values keep their defaults
        assert_eq!(jobs.health_check.interval_minutes, 5);
        assert_eq!(
            jobs.daily_analytics.run_at,
            NaiveTime::from_hms_opt(1, 15, 0).unwrap()
        );
        assert_eq!(jobs.activity_log_cleanup.retention_days, 30);
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_db_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolve_rejects_zero_interval() {
        let temp_dir = make_temp_db_dir();
        let file_config: FileConfig =
            toml::from_str("[background_jobs.cache_cleanup]\ninterval_minutes = 0\n").unwrap();

        let err = AppConfig::resolve(&cli_for(&temp_dir), Some(file_config)).unwrap_err();
        assert!(err
            .to_string()
            .contains("background_jobs.cache_cleanup.interval_minutes"));
    }

    #[test]
    fn test_resolve_rejects_out_of_range_values() {
        let temp_dir = make_temp_db_dir();
        for (table, key, value) in [
            ("search_index", "interval_minutes", MAX_INTERVAL_MINUTES + 1),
            ("health_check", "timeout_secs", MAX_TIMEOUT_SECS + 1),
            ("activity_log_cleanup", "retention_days", i64::MAX as u64),
        ] {
            let toml = format!("[background_jobs.{}]\n{} = {}\n", table, key, value);
            let file_config: FileConfig = toml::from_str(&toml).unwrap();

            let err = AppConfig::resolve(&cli_for(&temp_dir), Some(file_config)).unwrap_err();
            let expected = format!("background_jobs.{}.{} must be at most", table, key);
            assert!(err.to_string().contains(&expected), "{}", err);
        }
    }

    #[test]
    fn test_resolve_accepts_upper_bounds() {
        let temp_dir = make_temp_db_dir();
        let toml = format!(
            "[background_jobs.cache_cleanup]\ninterval_minutes = {}\n\n\
             [background_jobs.activity_log_cleanup]\nretention_days = {}\n",
            MAX_INTERVAL_MINUTES, MAX_RETENTION_DAYS
        );
        let file_config: FileConfig = toml::from_str(&toml).unwrap();

        let config = AppConfig::resolve(&cli_for(&temp_dir), Some(file_config)).unwrap();
        let jobs = &config.background_jobs;
        assert_eq!(jobs.cache_cleanup.interval_minutes, MAX_INTERVAL_MINUTES);
        assert_eq!(jobs.activity_log_cleanup.retention_days, MAX_RETENTION_DAYS);
    }

    #[test]
    fn test_resolve_rejects_bad_run_at() {
        let temp_dir = make_temp_db_dir();
        let file_config: FileConfig =
            toml::from_str("[background_jobs.daily_analytics]\nrun_at = \"midnight\"\n").unwrap();

        let err = AppConfig::resolve(&cli_for(&temp_dir), Some(file_config)).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid time 'midnight'"));
    }

    #[test]
    fn test_resolve_rejects_zero_ttl_override() {
        let temp_dir = make_temp_db_dir();
        let file_config: FileConfig =
            toml::from_str("[widget_cache.ttl_overrides]\nweather = 0\n").unwrap();

        let err = AppConfig::resolve(&cli_for(&temp_dir), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("weather"));
    }

    #[test]
    fn test_load_file_config() {
        let temp_dir = make_temp_db_dir();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "metrics_port = 9200\n").unwrap();

        let file_config = FileConfig::load(&path).unwrap();
        assert_eq!(file_config.metrics_port, Some(9200));

        std::fs::write(&path, "metrics_port = \"nope\"\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }

    #[test]
    fn test_dashboard_db_path() {
        let temp_dir = make_temp_db_dir();
        let config = AppConfig::resolve(&cli_for(&temp_dir), None).unwrap();
        assert_eq!(config.dashboard_db_path(), temp_dir.path().join("dashboard.db"));
    }
}
