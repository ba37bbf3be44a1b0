use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "allocation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Active,
    Completed,
}

/// A user's commitment of balance to a fixed daily-return service.
///
/// `last_payout_at` is the accrual watermark: earnings have been credited
/// through that instant and it only ever moves forward.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub invested_amount: i64,
    pub daily_return: i64,
    pub duration_days: Option<i64>,
    pub total_earned: i64,
    pub status: AllocationStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_payout_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAllocation {
    pub service_id: String,
}
