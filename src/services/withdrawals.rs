use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::deposits::PaymentMethod;
use crate::models::users::User;
use crate::models::withdrawals::Withdrawal;
use crate::repositories::allocations::AllocationRepository;
use crate::repositories::users::UserRepository;
use crate::repositories::withdrawals::WithdrawalRepository;

/// Smallest withdrawal accepted, in whole XAF.
pub const MIN_WITHDRAWAL_AMOUNT: i64 = 3000;
/// Active referrals required before any withdrawal.
pub const REQUIRED_ACTIVE_REFERRALS: i64 = 3;

pub enum WithdrawalRequest {
    Request {
        user_id: String,
        amount: i64,
        method: PaymentMethod,
        account_info: String,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
    List {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Withdrawal>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    repository: WithdrawalRepository,
    users: UserRepository,
    allocations: AllocationRepository,
}

impl WithdrawalRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = WithdrawalRepository::new(sql_conn.clone());
        let users = UserRepository::new(sql_conn.clone());
        let allocations = AllocationRepository::new(sql_conn);

        WithdrawalRequestHandler {
            repository,
            users,
            allocations,
        }
    }

    async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: i64,
        method: PaymentMethod,
        account_info: &str,
    ) -> Result<Withdrawal, ServiceError> {
        if amount < MIN_WITHDRAWAL_AMOUNT {
            return Err(ServiceError::Validation(format!(
                "Minimum withdrawal is {} XAF",
                MIN_WITHDRAWAL_AMOUNT
            )));
        }

        let user = self
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(|e| {
                ServiceError::Repository("WithdrawalService".to_string(), e.to_string())
            })?
            .ok_or(ServiceError::NotFound("User"))?;

        let active_referrals = self
            .users
            .count_active_referrals(&user.referral_code)
            .await
            .map_err(|e| {
                ServiceError::Repository("WithdrawalService".to_string(), e.to_string())
            })?;

        let allocation_count = self
            .allocations
            .count_for_user(user_id)
            .await
            .map_err(|e| {
                ServiceError::Repository("WithdrawalService".to_string(), e.to_string())
            })?;

        check_eligibility(amount, &user, active_referrals, allocation_count)?;

        let withdrawal = self
            .repository
            .insert_withdrawal(user_id, amount, method, account_info)
            .await
            .map_err(|e| {
                ServiceError::Repository("WithdrawalService".to_string(), e.to_string())
            })?;

        // The conditional debit can still miss if a concurrent operation
        // drained the balance after the eligibility read.
        match withdrawal {
            Some(withdrawal) => {
                log::info!("User {} requested withdrawal of {}", user_id, amount);
                Ok(withdrawal)
            }
            None => Err(ServiceError::InsufficientBalance),
        }
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Withdrawal>, ServiceError> {
        self.repository
            .list_for_user(user_id)
            .await
            .map_err(|e| ServiceError::Repository("WithdrawalService".to_string(), e.to_string()))
    }
}

/// Eligibility checks in their user-visible order: balance, referral
/// threshold, allocation presence.
fn check_eligibility(
    amount: i64,
    user: &User,
    active_referrals: i64,
    allocation_count: i64,
) -> Result<(), ServiceError> {
    if amount > user.balance {
        return Err(ServiceError::InsufficientBalance);
    }
    if active_referrals < REQUIRED_ACTIVE_REFERRALS {
        return Err(ServiceError::ReferralThresholdNotMet(
            REQUIRED_ACTIVE_REFERRALS,
        ));
    }
    if allocation_count == 0 {
        return Err(ServiceError::NoActiveAllocation);
    }
    Ok(())
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::Request {
                user_id,
                amount,
                method,
                account_info,
                response,
            } => {
                let withdrawal = self
                    .request_withdrawal(&user_id, amount, method, &account_info)
                    .await;
                let _ = response.send(withdrawal);
            }
            WithdrawalRequest::List { user_id, response } => {
                let withdrawals = self.list(&user_id).await;
                let _ = response.send(withdrawals);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with_balance(balance: i64) -> User {
        User {
            id: "user-1".to_string(),
            email: "user@example.com".to_string(),
            balance,
            referral_code: "ABC123".to_string(),
            referred_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insufficient_balance_rejected_first() {
        let user = user_with_balance(4000);
        let result = check_eligibility(5000, &user, 0, 0);
        assert!(matches!(result, Err(ServiceError::InsufficientBalance)));
    }

    #[test]
    fn referral_threshold_checked_before_allocations() {
        let user = user_with_balance(10000);
        let result = check_eligibility(5000, &user, 2, 0);
        assert!(matches!(
            result,
            Err(ServiceError::ReferralThresholdNotMet(3))
        ));
    }

    #[test]
    fn allocation_required() {
        let user = user_with_balance(10000);
        let result = check_eligibility(5000, &user, 3, 0);
        assert!(matches!(result, Err(ServiceError::NoActiveAllocation)));
    }

    #[test]
    fn eligible_request_passes() {
        let user = user_with_balance(10000);
        assert!(check_eligibility(5000, &user, 3, 1).is_ok());
    }

    #[test]
    fn exact_balance_is_withdrawable() {
        let user = user_with_balance(5000);
        assert!(check_eligibility(5000, &user, 3, 1).is_ok());
    }
}
