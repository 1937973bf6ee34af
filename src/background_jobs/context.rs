use crate::clock::Clock;
use crate::dashboard_store::DashboardStore;
use crate::widget_cache::WidgetCache;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains references to shared resources and a cancellation token
/// for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Dashboard database (activity log, metrics, health, notifications, job history).
    pub store: Arc<dyn DashboardStore>,

    /// The widget cache shared with request handlers.
    pub cache: Arc<WidgetCache>,

    /// Time source for day boundaries and retention cutoffs.
    pub clock: Arc<dyn Clock>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        store: Arc<dyn DashboardStore>,
        cache: Arc<WidgetCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cancellation_token,
            store,
            cache,
            clock,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Same resources, with a child token that is cancelled along with this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            ..self.clone()
        }
    }
}
