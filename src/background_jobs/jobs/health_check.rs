//! Application health polling.
//!
//! Probes every active application that has a health-check URL, records the
//! outcome in `application_health_status` and alerts the admins when a probe
//! fails. A failure for one application never stops the others from being
//! checked.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::config::HealthCheckJobSettings;
use crate::dashboard_store::{
    ApplicationStore, HealthState, HealthStatus, MonitoredApplication, NewNotification,
    NotificationSeverity, NotificationStore,
};
use crate::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const HEALTH_CHECK_USER_AGENT: &str = "Ganger-Platform-Health-Check/1.0";
pub const HEALTH_ALERT_CATEGORY: &str = "system_health";

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProbeResult {
    healthy: bool,
    response_time_ms: i64,
    error: Option<String>,
}

pub struct HealthCheckJob {
    interval_minutes: u64,
    admin_role: String,
    client: reqwest::Client,
}

impl HealthCheckJob {
    pub const ID: &'static str = "health_check";

    pub fn new(interval_minutes: u64, timeout: Duration, admin_role: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(HEALTH_CHECK_USER_AGENT)
            .build()
            .context("Failed to create health check HTTP client")?;
        Ok(Self {
            interval_minutes,
            admin_role,
            client,
        })
    }

    pub fn from_settings(settings: &HealthCheckJobSettings) -> Result<Self> {
        Self::new(
            settings.interval_minutes,
            Duration::from_secs(settings.timeout_secs),
            settings.admin_role.clone(),
        )
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        let outcome = self.client.get(url).send().await;
        let response_time_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(response) if response.status().is_success() => ProbeResult {
                healthy: true,
                response_time_ms,
                error: None,
            },
            Ok(response) => {
                let status = response.status();
                ProbeResult {
                    healthy: false,
                    response_time_ms,
                    error: Some(format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    )),
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    format!("Request timed out: {}", e)
                } else {
                    format!("Request failed: {}", e)
                };
                ProbeResult {
                    healthy: false,
                    response_time_ms,
                    error: Some(error),
                }
            }
        }
    }

    /// Probe, record and, if needed, alert for one application. Only a failed
    /// alert is returned as an error.
    async fn check_application(
        &self,
        ctx: &JobContext,
        app: &MonitoredApplication,
    ) -> Result<bool> {
        let result = self.probe(&app.health_check_url).await;
        let state = if result.healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        let recorded = ctx.store.upsert_health_status(&HealthStatus {
            application_name: app.app_name.clone(),
            health_check_url: app.health_check_url.clone(),
            status: state,
            last_check_at: ctx.clock.now(),
            response_time_ms: Some(result.response_time_ms),
            error_message: result.error.clone(),
        });
        // Alerting does not depend on the status row
        if let Err(e) = recorded {
            warn!("Failed to record health of {}: {:#}", app.app_name, e);
        }
        metrics::set_application_health(&app.app_name, result.healthy);

        if let Some(error) = &result.error {
            warn!(
                "Application {} is unhealthy ({}ms): {}",
                app.app_name, result.response_time_ms, error
            );
            self.alert_admins(ctx, app, result.response_time_ms, error)?;
        } else {
            debug!(
                "Application {} is healthy ({}ms)",
                app.app_name, result.response_time_ms
            );
        }
        Ok(result.healthy)
    }

    fn alert_admins(
        &self,
        ctx: &JobContext,
        app: &MonitoredApplication,
        response_time_ms: i64,
        error: &str,
    ) -> Result<()> {
        let admins = ctx
            .store
            .get_active_user_ids_with_role(&self.admin_role)
            .context("Failed to load admin users")?;
        if admins.is_empty() {
            debug!("No active {} users to alert", self.admin_role);
            return Ok(());
        }

        let title = format!("Application Health Alert: {}", app.display_name);
        let message = format!(
            "{} is experiencing issues. Response time: {}ms. Error: {}",
            app.display_name, response_time_ms, error
        );
        let notifications: Vec<NewNotification> = admins
            .into_iter()
            .map(|user_id| NewNotification {
                user_id,
                title: title.clone(),
                message: message.clone(),
                severity: NotificationSeverity::Warning,
                category: HEALTH_ALERT_CATEGORY.to_string(),
            })
            .collect();
        ctx.store
            .insert_notifications(&notifications)
            .with_context(|| format!("Failed to alert admins about {}", app.app_name))?;
        Ok(())
    }
}

#[async_trait]
impl BackgroundJob for HealthCheckJob {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Health Check"
    }

    fn description(&self) -> &'static str {
        "Probe platform applications and alert admins about failures"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_minutes.saturating_mul(60)))
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let apps = ctx
            .store
            .get_monitored_applications()
            .context("Failed to load monitored applications")?;

        let mut healthy = 0;
        let mut unhealthy = 0;
        for app in &apps {
            if ctx.is_cancelled() {
                info!(
                    "Health check cancelled after {} applications",
                    healthy + unhealthy
                );
                return Err(JobError::Cancelled);
            }
            match self.check_application(ctx, app).await {
                Ok(true) => healthy += 1,
                Ok(false) => unhealthy += 1,
                Err(e) => {
                    warn!("Health check for {} failed: {:#}", app.app_name, e);
                    unhealthy += 1;
                }
            }
        }

        info!(
            "Health check complete: {} applications, {} healthy, {} unhealthy",
            apps.len(),
            healthy,
            unhealthy
        );
        Ok(())
    }
}
