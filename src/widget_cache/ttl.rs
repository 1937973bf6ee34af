use std::collections::HashMap;
use std::time::Duration;

/// TTL applied to widgets without an entry in the table.
pub const DEFAULT_WIDGET_TTL: Duration = Duration::from_secs(300);

const BUILTIN_WIDGET_TTLS: &[(&str, u64)] = &[
    ("application_launcher", 3600),
    ("notifications_center", 60),
    ("team_activity", 300),
    ("pending_approvals", 300),
    ("upcoming_meetings", 900),
    ("recent_documents", 600),
    ("quick_actions", 3600),
    ("help_center", 7200),
    ("system_health", 300),
];

/// Per-widget cache lifetimes, with optional configured overrides.
#[derive(Debug, Clone, Default)]
pub struct WidgetTtlTable {
    overrides: HashMap<String, Duration>,
}

impl WidgetTtlTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override values are in seconds.
    pub fn with_overrides(overrides: &HashMap<String, u64>) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|(widget_id, secs)| (widget_id.clone(), Duration::from_secs(*secs)))
                .collect(),
        }
    }

    pub fn ttl_for(&self, widget_id: &str) -> Duration {
        if let Some(ttl) = self.overrides.get(widget_id) {
            return *ttl;
        }
        BUILTIN_WIDGET_TTLS
            .iter()
            .find(|(id, _)| *id == widget_id)
            .map(|(_, secs)| Duration::from_secs(*secs))
            .unwrap_or(DEFAULT_WIDGET_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ttls() {
        let table = WidgetTtlTable::new();
        assert_eq!(table.ttl_for("notifications_center"), Duration::from_secs(60));
        assert_eq!(table.ttl_for("help_center"), Duration::from_secs(7200));
        assert_eq!(table.ttl_for("unknown_widget"), DEFAULT_WIDGET_TTL);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = HashMap::from([
            ("team_activity".to_string(), 120),
            ("custom_widget".to_string(), 30),
        ]);
        let table = WidgetTtlTable::with_overrides(&overrides);
        assert_eq!(table.ttl_for("team_activity"), Duration::from_secs(120));
        assert_eq!(table.ttl_for("custom_widget"), Duration::from_secs(30));
        assert_eq!(table.ttl_for("quick_actions"), Duration::from_secs(3600));
    }
}
