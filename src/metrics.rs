use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Metric name prefix for all dashboard metrics
const PREFIX: &str = "dashboard";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Widget cache
    pub static ref WIDGET_CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_widget_cache_lookups_total"), "Widget cache lookups by tier and result"),
        &["tier", "result"]
    ).expect("Failed to create widget_cache_lookups_total metric");

    pub static ref WIDGET_CACHE_WRITES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_widget_cache_writes_total"), "Widget cache writes by tier and result"),
        &["tier", "result"]
    ).expect("Failed to create widget_cache_writes_total metric");

    pub static ref WIDGET_CACHE_MEMORY_ENTRIES: Gauge = Gauge::new(
        format!("{PREFIX}_widget_cache_memory_entries"),
        "Entries held in the in-memory widget cache tier"
    ).expect("Failed to create widget_cache_memory_entries metric");

    // Background jobs
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions by outcome"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is currently running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    // Health checks
    pub static ref APPLICATION_HEALTH: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_application_health"), "Last health check result (1 healthy, 0 unhealthy)"),
        &["application"]
    ).expect("Failed to create application_health metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (tests call this repeatedly)
    let _ = REGISTRY.register(Box::new(WIDGET_CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WIDGET_CACHE_WRITES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WIDGET_CACHE_MEMORY_ENTRIES.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(APPLICATION_HEALTH.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// `tier` is "memory" or "persistent"; `result` is "hit", "miss" or "error".
pub fn record_widget_cache_lookup(tier: &str, result: &str) {
    WIDGET_CACHE_LOOKUPS_TOTAL
        .with_label_values(&[tier, result])
        .inc();
}

pub fn record_widget_cache_write(tier: &str, result: &str) {
    WIDGET_CACHE_WRITES_TOTAL
        .with_label_values(&[tier, result])
        .inc();
}

pub fn set_widget_cache_memory_entries(count: usize) {
    WIDGET_CACHE_MEMORY_ENTRIES.set(count as f64);
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn set_application_health(application: &str, healthy: bool) {
    APPLICATION_HEALTH
        .with_label_values(&[application])
        .set(if healthy { 1.0 } else { 0.0 });
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serves `GET /metrics` until `shutdown` is cancelled.
pub async fn serve_metrics(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics on http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
