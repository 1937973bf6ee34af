//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{HealthServer, TestDashboard};
//!
//! #[tokio::test]
//! async fn test_health_check() {
//!     let server = HealthServer::spawn().await;
//!     let dashboard = TestDashboard::new().await;
//!     dashboard.add_application("inventory", Some(server.url_for("inventory")));
//!     dashboard.scheduler.run_health_check_now().await.unwrap();
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fixtures;
mod health_server;

pub use constants::*;
pub use fixtures::{display_name, TestDashboard};
pub use health_server::HealthServer;
