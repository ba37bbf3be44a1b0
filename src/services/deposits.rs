use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::deposits::{Deposit, DepositStatus, PaymentMethod, SettlementOutcome};
use crate::models::users::AuthUser;
use crate::repositories::deposits::DepositRepository;
use crate::repositories::users::UserRepository;
use crate::settings;

use std::sync::Arc;

/// Gateway status value that settles a deposit.
const ACCEPTED: &str = "ACCEPTED";

pub enum DepositRequest {
    Initiate {
        auth: AuthUser,
        amount: i64,
        method: PaymentMethod,
        phone_number: Option<String>,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    /// Gateway webhook confirmation; replay-safe by transaction reference.
    Confirm {
        transaction_reference: String,
        response: oneshot::Sender<Result<SettlementOutcome, ServiceError>>,
    },
    CheckStatus {
        transaction_reference: String,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    List {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Deposit>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct DepositRequestHandler {
    repository: Arc<DepositRepository>,
    users: UserRepository,
}

impl DepositRequestHandler {
    pub fn new(sql_conn: PgPool, gateway: settings::Cinetpay) -> Self {
        let repository = Arc::new(DepositRepository::new(sql_conn.clone(), gateway));
        let users = UserRepository::new(sql_conn);

        DepositRequestHandler { repository, users }
    }

    async fn initiate(
        &self,
        auth: &AuthUser,
        amount: i64,
        method: PaymentMethod,
        phone_number: Option<String>,
    ) -> Result<String, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(
                "Deposit amount must be positive".to_string(),
            ));
        }

        let user = self
            .users
            .get_user_by_id(&auth.uid)
            .await
            .map_err(|e| ServiceError::Repository("DepositService".to_string(), e.to_string()))?;
        if user.is_none() {
            return Err(ServiceError::NotFound("User"));
        }

        let deposit = self
            .repository
            .create_pending(&auth.uid, amount, method, phone_number.as_deref())
            .await
            .map_err(|e| ServiceError::Repository("DepositService".to_string(), e.to_string()))?;

        // Deposit stays pending if the gateway call fails; retrying opens a
        // new reference rather than reusing a half-initialized session.
        let payment_link = self
            .repository
            .payment_link(&deposit, auth)
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;

        Ok(payment_link)
    }

    async fn confirm(&self, transaction_reference: &str) -> Result<SettlementOutcome, ServiceError> {
        let deposit = self
            .repository
            .get_by_reference(transaction_reference)
            .await
            .map_err(|e| ServiceError::Repository("DepositService".to_string(), e.to_string()))?;

        let deposit = match deposit {
            Some(deposit) => deposit,
            None => return Ok(SettlementOutcome::NotFound),
        };

        if deposit.status == DepositStatus::Completed {
            return Ok(SettlementOutcome::AlreadyCompleted);
        }

        let status = self
            .repository
            .check_gateway(transaction_reference)
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;

        if status != ACCEPTED {
            return Ok(SettlementOutcome::Unsettled(status));
        }

        let outcome = self
            .repository
            .settle(&deposit)
            .await
            .map_err(|e| ServiceError::Repository("DepositService".to_string(), e.to_string()))?;

        if let SettlementOutcome::Credited { user_id, amount } = &outcome {
            log::info!(
                "Deposit {} settled: credited {} to user {}",
                transaction_reference,
                amount,
                user_id
            );
        }

        Ok(outcome)
    }

    async fn check_status(&self, transaction_reference: &str) -> Result<String, ServiceError> {
        self.repository
            .check_gateway(transaction_reference)
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Deposit>, ServiceError> {
        self.repository
            .list_for_user(user_id)
            .await
            .map_err(|e| ServiceError::Repository("DepositService".to_string(), e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<DepositRequest> for DepositRequestHandler {
    async fn handle_request(&self, request: DepositRequest) {
        match request {
            DepositRequest::Initiate {
                auth,
                amount,
                method,
                phone_number,
                response,
            } => {
                let link = self.initiate(&auth, amount, method, phone_number).await;
                let _ = response.send(link);
            }
            DepositRequest::Confirm {
                transaction_reference,
                response,
            } => {
                let outcome = self.confirm(&transaction_reference).await;
                let _ = response.send(outcome);
            }
            DepositRequest::CheckStatus {
                transaction_reference,
                response,
            } => {
                let status = self.check_status(&transaction_reference).await;
                let _ = response.send(status);
            }
            DepositRequest::List { user_id, response } => {
                let deposits = self.list(&user_id).await;
                let _ = response.send(deposits);
            }
        }
    }
}

pub struct DepositService;

impl DepositService {
    pub fn new() -> Self {
        DepositService {}
    }
}

#[async_trait]
impl Service<DepositRequest, DepositRequestHandler> for DepositService {}
