use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::referrals::{ClaimItem, ReferralSummary, ReferredActivity};
use crate::repositories::referrals::ReferralRepository;
use crate::repositories::users::UserRepository;

use std::collections::HashMap;

/// Flat bonus paid once a referral has deposited anything, in whole XAF.
pub const FLAT_BONUS: i64 = 150;
/// Percentage of the referral's total completed deposits, in percent.
pub const DEPOSIT_BONUS_PERCENT: i64 = 5;

pub enum ReferralRequest {
    Summary {
        user_id: String,
        response: oneshot::Sender<Result<ReferralSummary, ServiceError>>,
    },
    /// Pay out whatever bonus has accrued since the last claim.
    Claim {
        user_id: String,
        response: oneshot::Sender<Result<i64, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ReferralRequestHandler {
    repository: ReferralRepository,
    users: UserRepository,
}

impl ReferralRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = ReferralRepository::new(sql_conn.clone());
        let users = UserRepository::new(sql_conn);

        ReferralRequestHandler { repository, users }
    }

    async fn load_state(
        &self,
        user_id: &str,
    ) -> Result<(String, Vec<ReferredActivity>, HashMap<String, i64>), ServiceError> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(|e| ServiceError::Repository("ReferralService".to_string(), e.to_string()))?
            .ok_or(ServiceError::NotFound("User"))?;

        let activity = self
            .repository
            .referred_activity(&user.referral_code)
            .await
            .map_err(|e| ServiceError::Repository("ReferralService".to_string(), e.to_string()))?;

        let claimed = self
            .repository
            .claimed_amounts(user_id)
            .await
            .map_err(|e| ServiceError::Repository("ReferralService".to_string(), e.to_string()))?
            .into_iter()
            .map(|bonus| (bonus.referred_id, bonus.claimed_amount))
            .collect();

        Ok((user.referral_code, activity, claimed))
    }

    async fn summary(&self, user_id: &str) -> Result<ReferralSummary, ServiceError> {
        let (referral_code, activity, claimed) = self.load_state(user_id).await?;
        Ok(build_summary(referral_code, &activity, &claimed))
    }

    async fn claim(&self, user_id: &str) -> Result<i64, ServiceError> {
        let (_, activity, claimed) = self.load_state(user_id).await?;

        let items = claim_items(&activity, &claimed);
        if items.is_empty() {
            return Ok(0);
        }

        let credited = self
            .repository
            .apply_claim(user_id, &items)
            .await
            .map_err(|e| ServiceError::Repository("ReferralService".to_string(), e.to_string()))?;

        if credited > 0 {
            log::info!("User {} claimed referral bonus of {}", user_id, credited);
        }

        Ok(credited)
    }
}

/// Bonus a referrer is entitled to for one referral, based on that
/// referral's total completed deposits. No deposits, no bonus.
fn bonus_entitlement(total_deposited: i64) -> i64 {
    if total_deposited <= 0 {
        return 0;
    }
    FLAT_BONUS + total_deposited * DEPOSIT_BONUS_PERCENT / 100
}

/// Unclaimed delta per referral. Referrals whose entitlement has already
/// been paid in full produce no item.
fn claim_items(activity: &[ReferredActivity], claimed: &HashMap<String, i64>) -> Vec<ClaimItem> {
    activity
        .iter()
        .filter_map(|referral| {
            let entitled = bonus_entitlement(referral.total_deposited);
            let already = claimed.get(&referral.id).copied().unwrap_or(0);
            let delta = entitled - already;
            if delta > 0 {
                Some(ClaimItem {
                    referred_id: referral.id.clone(),
                    delta,
                    new_total: entitled,
                })
            } else {
                None
            }
        })
        .collect()
}

fn build_summary(
    referral_code: String,
    activity: &[ReferredActivity],
    claimed: &HashMap<String, i64>,
) -> ReferralSummary {
    let referrals: Vec<_> = activity
        .iter()
        .map(|referral| {
            let entitled = bonus_entitlement(referral.total_deposited);
            let already = claimed.get(&referral.id).copied().unwrap_or(0);
            crate::models::referrals::ReferralEntry {
                id: referral.id.clone(),
                email: referral.email.clone(),
                created_at: referral.created_at,
                total_deposited: referral.total_deposited,
                active: referral.total_deposited > 0 || referral.has_allocation,
                claimable: (entitled - already).max(0),
            }
        })
        .collect();

    let total_referrals = referrals.len();
    let active_referrals = referrals.iter().filter(|r| r.active).count();
    let claimable = referrals.iter().map(|r| r.claimable).sum();

    ReferralSummary {
        referral_code,
        referrals,
        total_referrals,
        active_referrals,
        claimable,
    }
}

#[async_trait]
impl RequestHandler<ReferralRequest> for ReferralRequestHandler {
    async fn handle_request(&self, request: ReferralRequest) {
        match request {
            ReferralRequest::Summary { user_id, response } => {
                let summary = self.summary(&user_id).await;
                let _ = response.send(summary);
            }
            ReferralRequest::Claim { user_id, response } => {
                let credited = self.claim(&user_id).await;
                let _ = response.send(credited);
            }
        }
    }
}

pub struct ReferralService;

impl ReferralService {
    pub fn new() -> Self {
        ReferralService {}
    }
}

#[async_trait]
impl Service<ReferralRequest, ReferralRequestHandler> for ReferralService {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn referral(id: &str, total_deposited: i64, has_allocation: bool) -> ReferredActivity {
        ReferredActivity {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            created_at: Utc::now(),
            total_deposited,
            has_allocation,
        }
    }

    #[test]
    fn no_deposits_no_bonus() {
        assert_eq!(bonus_entitlement(0), 0);
    }

    #[test]
    fn bonus_is_flat_plus_percentage() {
        // 150 + 5% of 5000
        assert_eq!(bonus_entitlement(5000), 400);
    }

    #[test]
    fn bonus_percentage_uses_floor_division() {
        // 5% of 1010 is 50.5; whole-unit currency floors to 50
        assert_eq!(bonus_entitlement(1010), 200);
    }

    #[test]
    fn claim_without_basis_yields_no_items() {
        let activity = vec![referral("a", 0, false), referral("b", 0, true)];
        let items = claim_items(&activity, &HashMap::new());
        assert!(items.is_empty());
    }

    #[test]
    fn first_claim_pays_full_entitlement() {
        let activity = vec![referral("a", 5000, false)];
        let items = claim_items(&activity, &HashMap::new());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].delta, 400);
        assert_eq!(items[0].new_total, 400);
    }

    #[test]
    fn repeat_claim_pays_only_the_delta() {
        let activity = vec![referral("a", 8000, false)];
        let claimed = HashMap::from([("a".to_string(), 400)]);

        let items = claim_items(&activity, &claimed);
        assert_eq!(items.len(), 1);
        // entitlement grew from 400 to 150 + 400 = 550
        assert_eq!(items[0].delta, 150);
        assert_eq!(items[0].new_total, 550);
    }

    #[test]
    fn fully_claimed_referral_is_skipped() {
        let activity = vec![referral("a", 5000, false)];
        let claimed = HashMap::from([("a".to_string(), 400)]);
        assert!(claim_items(&activity, &claimed).is_empty());
    }

    #[test]
    fn summary_counts_active_referrals() {
        let activity = vec![
            referral("a", 5000, false),
            referral("b", 0, true),
            referral("c", 0, false),
        ];
        let summary = build_summary("CODE".to_string(), &activity, &HashMap::new());

        assert_eq!(summary.total_referrals, 3);
        assert_eq!(summary.active_referrals, 2);
        assert_eq!(summary.claimable, 400);
    }
}
