//! End-to-end tests for application health polling
//!
//! A local HTTP server plays the monitored applications; the health check job
//! runs through the scheduler's manual trigger.

mod common;

use common::{
    display_name, HealthServer, TestDashboard, ADMIN_1_ID, ADMIN_2_ID, EOS_APP, HANDOUTS_APP,
    INACTIVE_ADMIN_ID, INVENTORY_APP, STAFF_ID,
};
use ganger_dashboard_jobs::dashboard_store::{
    ApplicationStore, HealthState, NotificationSeverity, NotificationStore,
};

#[tokio::test]
async fn test_only_failing_application_is_unhealthy() {
    let server = HealthServer::spawn().await;
    let dashboard = TestDashboard::new().await;
    for app in [INVENTORY_APP, HANDOUTS_APP, EOS_APP] {
        dashboard.add_application(app, Some(server.url_for(app)));
    }
    server.set_failing(HANDOUTS_APP, true);

    dashboard.scheduler.run_health_check_now().await.unwrap();

    let statuses = dashboard.store.list_health_statuses().unwrap();
    assert_eq!(statuses.len(), 3);
    for status in &statuses {
        let expected = if status.application_name == HANDOUTS_APP {
            HealthState::Unhealthy
        } else {
            HealthState::Healthy
        };
        assert_eq!(status.status, expected, "{}", status.application_name);
    }

    let failing = dashboard.store.get_health_status(HANDOUTS_APP).unwrap().unwrap();
    assert_eq!(
        failing.error_message.as_deref(),
        Some("HTTP 500: Internal Server Error")
    );
    assert_eq!(failing.health_check_url, server.url_for(HANDOUTS_APP));
}

#[tokio::test]
async fn test_failure_alerts_every_active_admin() {
    let server = HealthServer::spawn().await;
    let dashboard = TestDashboard::new().await;
    dashboard.add_application(INVENTORY_APP, Some(server.url_for(INVENTORY_APP)));
    dashboard.add_application(HANDOUTS_APP, Some(server.url_for(HANDOUTS_APP)));
    server.set_failing(HANDOUTS_APP, true);

    dashboard.scheduler.run_health_check_now().await.unwrap();

    let expected_title = format!("Application Health Alert: {}", display_name(HANDOUTS_APP));
    for admin in [ADMIN_1_ID, ADMIN_2_ID] {
        let alerts = dashboard
            .store
            .get_notifications_for_user(admin, 10)
            .unwrap();
        assert_eq!(alerts.len(), 1, "alerts for {}", admin);
        assert_eq!(alerts[0].title, expected_title);
        assert_eq!(alerts[0].severity, NotificationSeverity::Warning);
        assert_eq!(alerts[0].category, "system_health");
        assert!(alerts[0].message.contains("Error: HTTP 500"));
    }
    for user in [INACTIVE_ADMIN_ID, STAFF_ID] {
        assert!(dashboard
            .store
            .get_notifications_for_user(user, 10)
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn test_recovery_overwrites_status() {
    let server = HealthServer::spawn().await;
    let dashboard = TestDashboard::new().await;
    dashboard.add_application(INVENTORY_APP, Some(server.url_for(INVENTORY_APP)));

    server.set_failing(INVENTORY_APP, true);
    dashboard.scheduler.run_health_check_now().await.unwrap();
    server.set_failing(INVENTORY_APP, false);
    dashboard.scheduler.run_health_check_now().await.unwrap();

    let status = dashboard.store.get_health_status(INVENTORY_APP).unwrap().unwrap();
    assert_eq!(status.status, HealthState::Healthy);
    assert_eq!(status.error_message, None);
    // One alert from the failed round, none from the healthy one
    assert_eq!(
        dashboard
            .store
            .get_notifications_for_user(ADMIN_1_ID, 10)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_applications_without_url_are_skipped() {
    let dashboard = TestDashboard::new().await;
    dashboard.add_application(EOS_APP, None);

    dashboard.scheduler.run_health_check_now().await.unwrap();

    assert!(dashboard.store.list_health_statuses().unwrap().is_empty());
}
