use serde::{Deserialize, Serialize};

/// An investment product users can allocate balance into.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    /// Absolute daily return in whole XAF.
    pub daily_return: i64,
    /// Term length in days; open-ended when absent.
    pub duration_days: Option<i64>,
    pub category: String,
}
