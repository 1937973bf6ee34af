//! Daily usage analytics.
//!
//! Aggregates the previous local calendar day of the user activity log into
//! `dashboard_metrics` rows: distinct active users, launches per application,
//! widget interactions and search queries. A manual trigger may pick the day
//! with `{"date": "YYYY-MM-DD"}`.
//!
//! Without a date, days missed since the last completed scheduled run are
//! aggregated too, oldest first, up to [`MAX_CATCH_UP_DAYS`].

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
    schedule::local_day_bounds,
    scheduler::TRIGGER_SCHEDULE,
};
use crate::config::DailyAnalyticsJobSettings;
use crate::dashboard_store::{
    ActivityLogStore, ActivityType, JobRunStatus, JobStore, Metric, MetricDimensions, MetricType,
    MetricsStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

/// Most days a single run aggregates, yesterday included.
pub const MAX_CATCH_UP_DAYS: u64 = 7;

/// Recent runs searched for the last completed scheduled one.
const HISTORY_SCAN_LIMIT: usize = 50;

/// Days from the one after `last_aggregated` through `yesterday`, keeping only
/// the newest [`MAX_CATCH_UP_DAYS`]. Always contains `yesterday`.
fn catch_up_dates(last_aggregated: Option<NaiveDate>, yesterday: NaiveDate) -> Vec<NaiveDate> {
    let oldest_allowed = yesterday
        .checked_sub_days(Days::new(MAX_CATCH_UP_DAYS - 1))
        .unwrap_or(yesterday);
    let first = match last_aggregated.and_then(|d| d.succ_opt()) {
        Some(first) if first < oldest_allowed => {
            warn!(
                "Analytics missed more than {} days, catching up from {}",
                MAX_CATCH_UP_DAYS, oldest_allowed
            );
            oldest_allowed
        }
        Some(first) => first.min(yesterday),
        None => yesterday,
    };
    first.iter_days().take_while(|d| *d <= yesterday).collect()
}

pub struct DailyAnalyticsJob {
    run_at: NaiveTime,
}

impl DailyAnalyticsJob {
    pub const ID: &'static str = "daily_analytics";

    pub fn from_settings(settings: &DailyAnalyticsJobSettings) -> Self {
        Self {
            run_at: settings.run_at,
        }
    }

    fn target_date(params: Option<&JsonValue>, now: DateTime<Utc>) -> Result<NaiveDate, JobError> {
        match params.and_then(|p| p.get("date")) {
            Some(JsonValue::String(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| {
                    JobError::ExecutionFailed(format!("Invalid date parameter '{}': {}", date, e))
                }),
            Some(other) => Err(JobError::ExecutionFailed(format!(
                "Invalid date parameter: {}",
                other
            ))),
            None => now
                .with_timezone(&Local)
                .date_naive()
                .pred_opt()
                .ok_or_else(|| JobError::ExecutionFailed("No previous day".to_string())),
        }
    }

    /// The day aggregated by the last completed scheduled run.
    fn last_aggregated_day(ctx: &JobContext) -> Option<NaiveDate> {
        let history = match ctx.store.get_job_history(Self::ID, HISTORY_SCAN_LIMIT) {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to read analytics history, no catch-up: {:#}", e);
                return None;
            }
        };
        history
            .iter()
            .find(|run| {
                run.status == JobRunStatus::Completed && run.triggered_by == TRIGGER_SCHEDULE
            })
            .and_then(|run| run.started_at.with_timezone(&Local).date_naive().pred_opt())
    }

    async fn aggregate(&self, ctx: &JobContext, date: NaiveDate) -> Result<(), JobError> {
        let (from, to) = local_day_bounds(&Local, date).ok_or_else(|| {
            JobError::ExecutionFailed(format!("Cannot compute day bounds for {}", date))
        })?;
        let store = &ctx.store;
        let query_failed = |what: &str, e: anyhow::Error| {
            JobError::ExecutionFailed(format!("Failed to count {}: {:#}", what, e))
        };

        let active_users = store
            .count_distinct_active_users(from, to)
            .map_err(|e| query_failed("active users", e))?;
        let launches = store
            .count_app_launches_by_app(from, to)
            .map_err(|e| query_failed("app launches", e))?;
        let widget_interactions = store
            .count_activities(&ActivityType::WidgetInteraction, from, to)
            .map_err(|e| query_failed("widget interactions", e))?;
        let search_queries = store
            .count_activities(&ActivityType::Search, from, to)
            .map_err(|e| query_failed("search queries", e))?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let recorded_at = ctx.clock.now();
        let metric = |metric_type, value: usize, dimensions| Metric {
            metric_type,
            metric_date: date,
            value: value as i64,
            dimensions,
            recorded_at,
        };

        let mut metrics = vec![metric(
            MetricType::DailyActiveUsers,
            active_users,
            MetricDimensions::default(),
        )];
        metrics.extend(launches.iter().map(|(app, count)| {
            metric(
                MetricType::AppLaunches,
                *count,
                MetricDimensions::for_application(app.as_str()),
            )
        }));
        metrics.push(metric(
            MetricType::WidgetInteractions,
            widget_interactions,
            MetricDimensions::default(),
        ));
        metrics.push(metric(
            MetricType::SearchQueries,
            search_queries,
            MetricDimensions::default(),
        ));

        let mut failed = 0;
        for m in &metrics {
            if let Err(e) = store.upsert_metric(m) {
                warn!(
                    "Failed to write {} metric for {}: {:#}",
                    m.metric_type.as_str(),
                    date,
                    e
                );
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(JobError::ExecutionFailed(format!(
                "{} of {} metric writes failed for {}",
                failed,
                metrics.len(),
                date
            )));
        }

        info!(
            "Analytics for {}: {} active users, {} apps launched, {} widget interactions, {} searches",
            date,
            active_users,
            launches.len(),
            widget_interactions,
            search_queries
        );
        Ok(())
    }
}

#[async_trait]
impl BackgroundJob for DailyAnalyticsJob {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Daily Analytics"
    }

    fn description(&self) -> &'static str {
        "Aggregate the previous day's dashboard usage into metrics"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::DailyAt(self.run_at)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        self.execute_with_params(ctx, None).await
    }

    async fn execute_with_params(
        &self,
        ctx: &JobContext,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let date = Self::target_date(params.as_ref(), ctx.clock.now())?;
        let explicit = params.as_ref().is_some_and(|p| p.get("date").is_some());
        let dates = if explicit {
            vec![date]
        } else {
            catch_up_dates(Self::last_aggregated_day(ctx), date)
        };
        if dates.len() > 1 {
            info!(
                "Catching up analytics for {} days starting {}",
                dates.len(),
                dates[0]
            );
        }

        for date in dates {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            self.aggregate(ctx, date).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::create_test_context;
    use crate::clock::Clock;
    use crate::dashboard_store::ActivityLogEntry;
    use chrono::Duration;
    use serde_json::json;

    fn record(
        ctx: &JobContext,
        user: &str,
        activity_type: ActivityType,
        app: Option<&str>,
        at: DateTime<Utc>,
    ) {
        ctx.store
            .record_activity(&ActivityLogEntry {
                user_id: user.to_string(),
                activity_type,
                target_app: app.map(str::to_string),
                created_at: at,
            })
            .unwrap();
    }

    fn job() -> DailyAnalyticsJob {
        DailyAnalyticsJob::from_settings(&DailyAnalyticsJobSettings::default())
    }

    #[test]
    fn test_job_schedule() {
        assert_eq!(
            job().schedule(),
            JobSchedule::DailyAt(NaiveTime::from_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_target_date_param() {
        let now = Utc::now();
        assert_eq!(
            DailyAnalyticsJob::target_date(Some(&json!({"date": "2024-03-01"})), now).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(DailyAnalyticsJob::target_date(Some(&json!({"date": "yesterday"})), now).is_err());
        assert!(DailyAnalyticsJob::target_date(Some(&json!({"date": 5})), now).is_err());

        let yesterday = now.with_timezone(&Local).date_naive().pred_opt().unwrap();
        assert_eq!(DailyAnalyticsJob::target_date(None, now).unwrap(), yesterday);
        assert_eq!(
            DailyAnalyticsJob::target_date(Some(&json!({})), now).unwrap(),
            yesterday
        );
    }

    #[tokio::test]
    async fn test_aggregates_yesterday() {
        let test = create_test_context();
        let ctx = &test.ctx;
        let yesterday = ctx
            .clock
            .now()
            .with_timezone(&Local)
            .date_naive()
            .pred_opt()
            .unwrap();
        let (start, end) = local_day_bounds(&Local, yesterday).unwrap();
        let hour = |h: i64| start + Duration::hours(h);

        record(ctx, "u1", ActivityType::AppLaunch, Some("inventory"), hour(1));
        record(ctx, "u2", ActivityType::AppLaunch, Some("inventory"), hour(2));
        record(ctx, "u2", ActivityType::AppLaunch, Some("handouts"), hour(3));
        record(ctx, "u3", ActivityType::Search, None, hour(4));
        record(ctx, "u3", ActivityType::WidgetInteraction, None, hour(5));
        // The day after must not count
        record(ctx, "u4", ActivityType::Search, None, end);

        job().execute(ctx).await.unwrap();

        let dau = ctx
            .store
            .get_metrics(MetricType::DailyActiveUsers, yesterday)
            .unwrap();
        assert_eq!(dau.len(), 1);
        assert_eq!(dau[0].value, 3);

        let launches = ctx
            .store
            .get_metrics(MetricType::AppLaunches, yesterday)
            .unwrap();
        let per_app: Vec<(Option<String>, i64)> = launches
            .into_iter()
            .map(|m| (m.dimensions.application_name, m.value))
            .collect();
        assert_eq!(
            per_app,
            vec![
                (Some("handouts".to_string()), 1),
                (Some("inventory".to_string()), 2)
            ]
        );

        let searches = ctx
            .store
            .get_metrics(MetricType::SearchQueries, yesterday)
            .unwrap();
        assert_eq!(searches[0].value, 1);
        let interactions = ctx
            .store
            .get_metrics(MetricType::WidgetInteractions, yesterday)
            .unwrap();
        assert_eq!(interactions[0].value, 1);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_metrics() {
        let test = create_test_context();
        let ctx = &test.ctx;
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (start, _) = local_day_bounds(&Local, date).unwrap();
        let params = Some(json!({"date": "2024-03-01"}));

        record(ctx, "u1", ActivityType::Search, None, start);
        job().execute_with_params(ctx, params.clone()).await.unwrap();
        record(ctx, "u2", ActivityType::Search, None, start);
        job().execute_with_params(ctx, params).await.unwrap();

        let dau = ctx.store.get_metrics(MetricType::DailyActiveUsers, date).unwrap();
        assert_eq!(dau.len(), 1);
        assert_eq!(dau[0].value, 2);
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_catch_up_dates() {
        let yesterday = day(2024, 3, 10);
        assert_eq!(catch_up_dates(None, yesterday), vec![yesterday]);
        assert_eq!(catch_up_dates(Some(day(2024, 3, 9)), yesterday), vec![yesterday]);
        // Already covered, yesterday is aggregated again
        assert_eq!(catch_up_dates(Some(yesterday), yesterday), vec![yesterday]);
        assert_eq!(
            catch_up_dates(Some(day(2024, 3, 6)), yesterday),
            vec![day(2024, 3, 7), day(2024, 3, 8), day(2024, 3, 9), yesterday]
        );

        let capped = catch_up_dates(Some(day(2024, 1, 1)), yesterday);
        assert_eq!(capped.len(), MAX_CATCH_UP_DAYS as usize);
        assert_eq!(capped[0], day(2024, 3, 4));
        assert_eq!(capped.last(), Some(&yesterday));
    }

    #[tokio::test]
    async fn test_scheduled_run_backfills_missed_days() {
        let test = create_test_context();
        let ctx = &test.ctx;
        let now = test.clock.now();

        let today = now.with_timezone(&Local).date_naive();
        let (three_days_ago, _) = local_day_bounds(&Local, today - Duration::days(3)).unwrap();

        // Last scheduled run happened three days ago
        test.clock.set(three_days_ago + Duration::hours(12));
        let run_id = test
            .store
            .record_job_start(DailyAnalyticsJob::ID, "schedule")
            .unwrap();
        test.store
            .record_job_finish(run_id, JobRunStatus::Completed, None)
            .unwrap();
        test.clock.set(now);

        let missed: Vec<NaiveDate> = (1..=3).map(|d| today - Duration::days(d)).collect();
        for (i, date) in missed.iter().enumerate() {
            let (start, _) = local_day_bounds(&Local, *date).unwrap();
            for user in 0..=i {
                let user = format!("u{}", user);
                record(ctx, &user, ActivityType::Search, None, start + Duration::hours(1));
            }
        }
        let already_covered = today - Duration::days(4);

        job().execute(ctx).await.unwrap();

        for (i, date) in missed.iter().enumerate() {
            let dau = ctx
                .store
                .get_metrics(MetricType::DailyActiveUsers, *date)
                .unwrap();
            assert_eq!(dau.len(), 1, "missing metrics for {}", date);
            assert_eq!(dau[0].value, i as i64 + 1);
        }
        assert!(ctx
            .store
            .get_metrics(MetricType::DailyActiveUsers, already_covered)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_explicit_date_skips_catch_up() {
        let test = create_test_context();
        let ctx = &test.ctx;
        let now = test.clock.now();
        test.clock.set(now - Duration::days(5));
        let run_id = test
            .store
            .record_job_start(DailyAnalyticsJob::ID, "schedule")
            .unwrap();
        test.store
            .record_job_finish(run_id, JobRunStatus::Completed, None)
            .unwrap();
        test.clock.set(now);

        job()
            .execute_with_params(ctx, Some(json!({"date": "2024-03-01"})))
            .await
            .unwrap();

        let yesterday = now.with_timezone(&Local).date_naive().pred_opt().unwrap();
        assert!(ctx
            .store
            .get_metrics(MetricType::DailyActiveUsers, yesterday)
            .unwrap()
            .is_empty());
        assert_eq!(
            ctx.store
                .get_metrics(MetricType::DailyActiveUsers, day(2024, 3, 1))
                .unwrap()
                .len(),
            1
        );
    }
}
