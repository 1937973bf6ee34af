//! Shared identifiers for dashboard test fixtures

pub const ADMIN_ROLE: &str = "superadmin";
pub const ADMIN_1_ID: &str = "admin-1";
pub const ADMIN_2_ID: &str = "admin-2";
pub const INACTIVE_ADMIN_ID: &str = "admin-retired";
pub const STAFF_ID: &str = "staff-1";

pub const INVENTORY_APP: &str = "inventory";
pub const HANDOUTS_APP: &str = "handouts";
pub const EOS_APP: &str = "eos";

pub const TEAM_ACTIVITY_WIDGET: &str = "team_activity";
pub const WEATHER_WIDGET: &str = "weather";
