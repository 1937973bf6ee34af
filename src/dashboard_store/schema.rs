//! SQLite schema definitions for the dashboard database.
//!
//! Version 1 holds the widget cache and the tables the maintenance jobs read
//! from and write to. Version 2 adds job execution history and durable
//! schedule state.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Widget cache, metrics, health, notifications, activity
// =============================================================================

/// Owner-scoped widget payloads. Global entries are never persisted.
const WIDGET_DATA_CACHE_TABLE_V1: Table = Table {
    name: "widget_data_cache",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("widget_id", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "hit_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_accessed_at", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_widget_data_cache_expires_at", "expires_at")],
    unique_constraints: &[&["widget_id", "user_id"]],
};

/// Aggregated usage metrics. Absent dimensions are stored as '' so the
/// natural-key constraint holds.
const DASHBOARD_METRICS_TABLE_V1: Table = Table {
    name: "dashboard_metrics",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("metric_type", &SqlType::Text, non_null = true),
        sqlite_column!("metric_date", &SqlType::Text, non_null = true),
        sqlite_column!("metric_value", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "user_role",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "location_name",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "application_name",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("metric_metadata", &SqlType::Text),
        sqlite_column!("recorded_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_dashboard_metrics_type_date", "metric_type, metric_date")],
    unique_constraints: &[&[
        "metric_type",
        "metric_date",
        "user_role",
        "location_name",
        "application_name",
    ]],
};

/// Latest health probe result per application, overwritten on each check.
const APPLICATION_HEALTH_STATUS_TABLE_V1: Table = Table {
    name: "application_health_status",
    columns: &[
        sqlite_column!("application_name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("health_check_url", &SqlType::Text, non_null = true),
        sqlite_column!("current_status", &SqlType::Text, non_null = true),
        sqlite_column!("last_check_at", &SqlType::Integer, non_null = true),
        sqlite_column!("response_time_ms", &SqlType::Integer),
        sqlite_column!("error_message", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const NOTIFICATIONS_TABLE_V1: Table = Table {
    name: "notifications",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("type", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_notifications_user_created", "user_id, created_at DESC")],
    unique_constraints: &[],
};

const USER_ACTIVITY_LOG_TABLE_V1: Table = Table {
    name: "user_activity_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("activity_type", &SqlType::Text, non_null = true),
        sqlite_column!("target_app", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_user_activity_log_created_at", "created_at"),
        ("idx_user_activity_log_type_created", "activity_type, created_at"),
    ],
    unique_constraints: &[],
};

const PLATFORM_APPLICATIONS_TABLE_V1: Table = Table {
    name: "platform_applications",
    columns: &[
        sqlite_column!("app_name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("display_name", &SqlType::Text, non_null = true),
        sqlite_column!("health_check_url", &SqlType::Text),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    indices: &[("idx_users_role", "role")],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Job runs and schedules
// =============================================================================

/// History of background job executions.
const JOB_RUNS_TABLE_V2: Table = Table {
    name: "job_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer, non_null = true),
        sqlite_column!("finished_at", &SqlType::Integer),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_job_runs_job_id_started", "job_id, started_at DESC"),
        ("idx_job_runs_status", "status"),
    ],
    unique_constraints: &[],
};

/// Next run time per job, so a restart can catch up a missed trigger.
const JOB_SCHEDULES_TABLE_V2: Table = Table {
    name: "job_schedules",
    columns: &[
        sqlite_column!("job_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("next_run_at", &SqlType::Integer, non_null = true),
        sqlite_column!("last_run_at", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    JOB_RUNS_TABLE_V2.create(conn)?;
    JOB_SCHEDULES_TABLE_V2.create(conn)?;
    Ok(())
}

pub const DASHBOARD_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            WIDGET_DATA_CACHE_TABLE_V1,
            DASHBOARD_METRICS_TABLE_V1,
            APPLICATION_HEALTH_STATUS_TABLE_V1,
            NOTIFICATIONS_TABLE_V1,
            USER_ACTIVITY_LOG_TABLE_V1,
            PLATFORM_APPLICATIONS_TABLE_V1,
            USERS_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            WIDGET_DATA_CACHE_TABLE_V1,
            DASHBOARD_METRICS_TABLE_V1,
            APPLICATION_HEALTH_STATUS_TABLE_V1,
            NOTIFICATIONS_TABLE_V1,
            USER_ACTIVITY_LOG_TABLE_V1,
            PLATFORM_APPLICATIONS_TABLE_V1,
            USERS_TABLE_V1,
            JOB_RUNS_TABLE_V2,
            JOB_SCHEDULES_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_every_version_creates_and_validates() {
        for schema in DASHBOARD_VERSIONED_SCHEMAS {
            let conn = Connection::open_in_memory().unwrap();
            schema.create(&conn).unwrap();
            schema.validate(&conn).unwrap();
        }
    }

    #[test]
    fn test_migration_v1_to_v2() {
        let conn = Connection::open_in_memory().unwrap();
        DASHBOARD_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        assert!(DASHBOARD_VERSIONED_SCHEMAS[1].validate(&conn).is_err());

        let migrate = DASHBOARD_VERSIONED_SCHEMAS[1].migration.unwrap();
        migrate(&conn).unwrap();

        DASHBOARD_VERSIONED_SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn test_metric_natural_key_rejects_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        DASHBOARD_VERSIONED_SCHEMAS.last().unwrap().create(&conn).unwrap();

        let insert = "INSERT INTO dashboard_metrics (metric_type, metric_date, metric_value, recorded_at)
                      VALUES ('daily_active_users', '2024-03-01', 3, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_widget_cache_defaults() {
        let conn = Connection::open_in_memory().unwrap();
        DASHBOARD_VERSIONED_SCHEMAS.last().unwrap().create(&conn).unwrap();

        conn.execute(
            "INSERT INTO widget_data_cache (widget_id, user_id, data, expires_at, created_at, updated_at)
             VALUES ('team_activity', 'user-1', '{}', 100, 0, 0)",
            [],
        )
        .unwrap();
        let (hit_count, last_accessed): (i64, Option<i64>) = conn
            .query_row(
                "SELECT hit_count, last_accessed_at FROM widget_data_cache",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(hit_count, 0);
        assert_eq!(last_accessed, None);
    }
}
