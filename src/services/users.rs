use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{AuthUser, User};
use crate::repositories::users::UserRepository;

pub enum UserRequest {
    /// Provision the ledger profile for an identity-provider user.
    Register {
        auth: AuthUser,
        referral_code: Option<String>,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    GetBalance {
        user_id: String,
        response: oneshot::Sender<Result<i64, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
}

impl UserRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = UserRepository::new(sql_conn);

        UserRequestHandler { repository }
    }

    async fn register(
        &self,
        auth: &AuthUser,
        referral_code: Option<&str>,
    ) -> Result<User, ServiceError> {
        self.repository
            .insert_profile(auth, referral_code)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))
    }

    async fn get_balance(&self, user_id: &str) -> Result<i64, ServiceError> {
        let user = self
            .repository
            .get_user_by_id(user_id)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?;

        match user {
            Some(user) => Ok(user.balance),
            None => Err(ServiceError::NotFound("User")),
        }
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register {
                auth,
                referral_code,
                response,
            } => {
                let user = self.register(&auth, referral_code.as_deref()).await;
                let _ = response.send(user);
            }
            UserRequest::GetBalance { user_id, response } => {
                let balance = self.get_balance(&user_id).await;
                let _ = response.send(balance);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
