use serde::{Deserialize, Serialize};

/// Activity snapshot of one referred user, as read from the ledger.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ReferredActivity {
    pub id: String,
    pub email: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub total_deposited: i64,
    pub has_allocation: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEntry {
    pub id: String,
    pub email: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub total_deposited: i64,
    pub active: bool,
    pub claimable: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    pub referral_code: String,
    pub referrals: Vec<ReferralEntry>,
    pub total_referrals: usize,
    pub active_referrals: usize,
    pub claimable: i64,
}

/// One row of a pending claim: raise the referred user's claimed ledger to
/// `new_total`, crediting `delta` to the referrer.
#[derive(Clone, Debug)]
pub struct ClaimItem {
    pub referred_id: String,
    pub delta: i64,
    pub new_total: i64,
}

/// Claim-ledger row keyed by (referrer, referred).
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReferralBonus {
    pub referred_id: String,
    pub claimed_amount: i64,
}
