use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ganger_dashboard_jobs::background_jobs::jobs::{
    ActivityLogCleanupJob, CacheCleanupJob, DailyAnalyticsJob, HealthCheckJob,
    SearchIndexUpdateJob,
};
use ganger_dashboard_jobs::background_jobs::{JobContext, JobScheduler};
use ganger_dashboard_jobs::clock::{Clock, SystemClock};
use ganger_dashboard_jobs::config;
use ganger_dashboard_jobs::dashboard_store::{DashboardStore, SqliteDashboardStore};
use ganger_dashboard_jobs::metrics;
use ganger_dashboard_jobs::search::{NoOpSearchIndexer, SearchIndexer};
use ganger_dashboard_jobs::widget_cache::{WidgetCache, WidgetTtlTable};

/// How long in-flight jobs get to finish after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding dashboard.db.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9092)]
    pub metrics_port: u16,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            metrics_port: args.metrics_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "dashboard-jobs {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  metrics_port: {}", app_config.metrics_port);

    let store: Arc<SqliteDashboardStore> = Arc::new(
        SqliteDashboardStore::new(app_config.dashboard_db_path())
            .context("Failed to open dashboard database")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(WidgetCache::new(
        store.clone(),
        clock.clone(),
        WidgetTtlTable::with_overrides(&app_config.widget_cache.ttl_overrides),
    ));

    metrics::init_metrics();
    let metrics_shutdown = CancellationToken::new();
    let metrics_port = app_config.metrics_port;
    let metrics_token = metrics_shutdown.clone();
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = metrics::serve_metrics(metrics_port, metrics_token).await {
            error!("Metrics server failed: {:#}", e);
        }
    });

    let job_context = JobContext::new(
        CancellationToken::new(),
        store.clone() as Arc<dyn DashboardStore>,
        cache,
        clock,
    );
    let scheduler = JobScheduler::new(job_context);

    let jobs_config = &app_config.background_jobs;
    let indexer: Arc<dyn SearchIndexer> = Arc::new(NoOpSearchIndexer);
    scheduler
        .register_job(Arc::new(SearchIndexUpdateJob::from_settings(
            &jobs_config.search_index,
            indexer,
        )))
        .await;
    scheduler
        .register_job(Arc::new(CacheCleanupJob::from_settings(
            &jobs_config.cache_cleanup,
        )))
        .await;
    scheduler
        .register_job(Arc::new(HealthCheckJob::from_settings(
            &jobs_config.health_check,
        )?))
        .await;
    scheduler
        .register_job(Arc::new(DailyAnalyticsJob::from_settings(
            &jobs_config.daily_analytics,
        )))
        .await;
    scheduler
        .register_job(Arc::new(ActivityLogCleanupJob::from_settings(
            &jobs_config.activity_log_cleanup,
        )))
        .await;

    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count().await
    );
    scheduler.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, initiating graceful shutdown");

    scheduler.shutdown(SHUTDOWN_GRACE).await;
    metrics_shutdown.cancel();
    if let Err(e) = metrics_server.await {
        error!("Metrics server task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
