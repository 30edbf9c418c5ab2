use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Direction;

/// Day-at-a-glance figures for the shop dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// Payments received since the start of the current UTC day.
    pub revenue: Decimal,
    pub jobs: JobCounts,
    pub new_customers_today: i64,
    pub recent_messages: Vec<RecentMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentMessage {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub direction: Direction,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
