use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::allocations::Allocation;
use crate::models::catalog::Service as CatalogService;
use crate::repositories::allocations::AllocationRepository;
use crate::repositories::catalog::CatalogRepository;
use crate::repositories::users::UserRepository;

pub enum AllocationRequest {
    ListServices {
        response: oneshot::Sender<Result<Vec<CatalogService>, ServiceError>>,
    },
    /// Spend balance on a service, opening an active allocation.
    Commit {
        user_id: String,
        service_id: String,
        response: oneshot::Sender<Result<Allocation, ServiceError>>,
    },
    List {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Allocation>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct AllocationRequestHandler {
    repository: AllocationRepository,
    catalog: CatalogRepository,
    users: UserRepository,
}

impl AllocationRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = AllocationRepository::new(sql_conn.clone());
        let catalog = CatalogRepository::new(sql_conn.clone());
        let users = UserRepository::new(sql_conn);

        AllocationRequestHandler {
            repository,
            catalog,
            users,
        }
    }

    async fn list_services(&self) -> Result<Vec<CatalogService>, ServiceError> {
        self.catalog
            .list_services()
            .await
            .map_err(|e| ServiceError::Repository("AllocationService".to_string(), e.to_string()))
    }

    async fn commit(&self, user_id: &str, service_id: &str) -> Result<Allocation, ServiceError> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(|e| {
                ServiceError::Repository("AllocationService".to_string(), e.to_string())
            })?;
        if user.is_none() {
            return Err(ServiceError::NotFound("User"));
        }

        let service = self
            .catalog
            .get_service(service_id)
            .await
            .map_err(|e| {
                ServiceError::Repository("AllocationService".to_string(), e.to_string())
            })?
            .ok_or(ServiceError::NotFound("Service"))?;

        let allocation = self
            .repository
            .commit_allocation(user_id, &service)
            .await
            .map_err(|e| {
                ServiceError::Repository("AllocationService".to_string(), e.to_string())
            })?;

        match allocation {
            Some(allocation) => {
                log::info!(
                    "User {} allocated {} to service {}",
                    user_id,
                    service.price,
                    service.id
                );
                Ok(allocation)
            }
            None => Err(ServiceError::InsufficientBalance),
        }
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Allocation>, ServiceError> {
        self.repository
            .list_for_user(user_id)
            .await
            .map_err(|e| ServiceError::Repository("AllocationService".to_string(), e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<AllocationRequest> for AllocationRequestHandler {
    async fn handle_request(&self, request: AllocationRequest) {
        match request {
            AllocationRequest::ListServices { response } => {
                let services = self.list_services().await;
                let _ = response.send(services);
            }
            AllocationRequest::Commit {
                user_id,
                service_id,
                response,
            } => {
                let allocation = self.commit(&user_id, &service_id).await;
                let _ = response.send(allocation);
            }
            AllocationRequest::List { user_id, response } => {
                let allocations = self.list(&user_id).await;
                let _ = response.send(allocations);
            }
        }
    }
}

pub struct AllocationService;

impl AllocationService {
    pub fn new() -> Self {
        AllocationService {}
    }
}

#[async_trait]
impl Service<AllocationRequest, AllocationRequestHandler> for AllocationService {}
