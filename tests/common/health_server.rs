//! A local HTTP server standing in for the monitored applications.
//!
//! `GET /{app}/health` answers 200 unless the app was marked failing, in which
//! case it answers 500. The server shuts down when dropped.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

type FailingApps = Arc<Mutex<HashSet<String>>>;

pub struct HealthServer {
    pub base_url: String,
    failing: FailingApps,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

async fn health(
    State(failing): State<FailingApps>,
    Path(app): Path<String>,
) -> (StatusCode, &'static str) {
    if failing.lock().unwrap().contains(&app) {
        (StatusCode::INTERNAL_SERVER_ERROR, "down")
    } else {
        (StatusCode::OK, "ok")
    }
}

impl HealthServer {
    pub async fn spawn() -> Self {
        let failing: FailingApps = Arc::new(Mutex::new(HashSet::new()));
        let app = Router::new()
            .route("/{app}/health", get(health))
            .with_state(failing.clone());

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind health server");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            failing,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url_for(&self, app: &str) -> String {
        format!("{}/{}/health", self.base_url, app)
    }

    pub fn set_failing(&self, app: &str, failing: bool) {
        let mut apps = self.failing.lock().unwrap();
        if failing {
            apps.insert(app.to_string());
        } else {
            apps.remove(app);
        }
    }
}
