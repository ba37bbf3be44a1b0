use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::repositories::identity::IdentityApi;
use crate::settings::Settings;

mod allocations;
mod deposits;
mod http;
pub mod payout;
mod referrals;
mod users;
mod withdrawals;

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid identity token")]
    InvalidToken,
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("At least {0} active referrals required")]
    ReferralThresholdNotMet(i64),
    #[error("No active allocation")]
    NoActiveAllocation,
    #[error("Payment gateway error: {0}")]
    Upstream(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (deposit_tx, mut deposit_rx) = mpsc::channel(512);
    let (allocation_tx, mut allocation_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);
    let (referral_tx, mut referral_rx) = mpsc::channel(512);

    log::info!("Starting user service.");
    let mut user_service = users::UserService::new();
    let user_pool = pool.clone();
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(user_pool), &mut user_rx)
            .await;
    });

    log::info!("Starting deposit service.");
    let mut deposit_service = deposits::DepositService::new();
    let deposit_pool = pool.clone();
    let gateway_settings = settings.cinetpay.clone();
    tokio::spawn(async move {
        deposit_service
            .run(
                deposits::DepositRequestHandler::new(deposit_pool, gateway_settings),
                &mut deposit_rx,
            )
            .await;
    });

    log::info!("Starting allocation service.");
    let mut allocation_service = allocations::AllocationService::new();
    let allocation_pool = pool.clone();
    tokio::spawn(async move {
        allocation_service
            .run(
                allocations::AllocationRequestHandler::new(allocation_pool),
                &mut allocation_rx,
            )
            .await;
    });

    log::info!("Starting withdrawal service.");
    let mut withdrawal_service = withdrawals::WithdrawalService::new();
    let withdrawal_pool = pool.clone();
    tokio::spawn(async move {
        withdrawal_service
            .run(
                withdrawals::WithdrawalRequestHandler::new(withdrawal_pool),
                &mut withdrawal_rx,
            )
            .await;
    });

    log::info!("Starting referral service.");
    let mut referral_service = referrals::ReferralService::new();
    let referral_pool = pool.clone();
    tokio::spawn(async move {
        referral_service
            .run(
                referrals::ReferralRequestHandler::new(referral_pool),
                &mut referral_rx,
            )
            .await;
    });

    log::info!("Starting payout scheduler.");
    let scheduler = payout::PayoutScheduler::new(
        pool.clone(),
        settings.payout.hour_utc,
        settings.payout.page_size,
    );
    scheduler.start_daily_task();

    log::info!("Starting HTTP server.");
    let identity = IdentityApi::new(settings.identity.url, settings.identity.api_key);
    http::start_http_server(
        &settings.server.bind,
        identity,
        user_tx,
        deposit_tx,
        allocation_tx,
        withdrawal_tx,
        referral_tx,
    )
    .await?;

    Ok(())
}
