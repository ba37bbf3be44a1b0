use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::allocations::AllocationRequest;
use super::deposits::DepositRequest;
use super::referrals::ReferralRequest;
use super::users::UserRequest;
use super::withdrawals::WithdrawalRequest;
use super::ServiceError;
use crate::models::deposits::{NewDeposit, SettlementOutcome};
use crate::models::allocations::NewAllocation;
use crate::models::users::{AuthUser, NewProfile};
use crate::models::withdrawals::NewWithdrawal;
use crate::repositories::identity::IdentityApi;

#[derive(Clone)]
struct AppState {
    identity: Arc<IdentityApi>,
    user_channel: mpsc::Sender<UserRequest>,
    deposit_channel: mpsc::Sender<DepositRequest>,
    allocation_channel: mpsc::Sender<AllocationRequest>,
    withdrawal_channel: mpsc::Sender<WithdrawalRequest>,
    referral_channel: mpsc::Sender<ReferralRequest>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ServiceError> {
    let token = bearer_token(headers).ok_or(ServiceError::Unauthenticated)?;

    match state.identity.verify_token(token).await {
        Ok(Some(auth)) => Ok(auth),
        Ok(None) => Err(ServiceError::InvalidToken),
        Err(e) => Err(ServiceError::Communication(
            "Identity".to_string(),
            e.to_string(),
        )),
    }
}

/// Send a request to a service and wait for its oneshot answer.
async fn dispatch<Req, T>(
    channel: &mpsc::Sender<Req>,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> Req,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("http".to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication("http".to_string(), e.to_string()))?
}

fn error_body(error: ServiceError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &error {
        ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ServiceError::InvalidToken => StatusCode::FORBIDDEN,
        ServiceError::Validation(_) | ServiceError::InsufficientBalance => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::ReferralThresholdNotMet(_) | ServiceError::NoActiveAllocation => {
            StatusCode::FORBIDDEN
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &error {
        ServiceError::Upstream(_)
        | ServiceError::Repository(..)
        | ServiceError::Communication(..) => {
            log::error!("{}", error);
            "Internal server error.".to_string()
        }
        _ => error.to_string(),
    };

    (status, Json(json!({ "error": message })))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "OK", "time": Utc::now().to_rfc3339() }))
}

async fn register_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewProfile>,
) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.user_channel, |response| UserRequest::Register {
        auth,
        referral_code: req.referral_code,
        response,
    })
    .await
    {
        Ok(user) => (StatusCode::CREATED, Json(json!(user))),
        Err(e) => error_body(e),
    }
}

async fn get_balance(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.user_channel, |response| UserRequest::GetBalance {
        user_id: auth.uid,
        response,
    })
    .await
    {
        Ok(balance) => (StatusCode::OK, Json(json!({ "balance": balance }))),
        Err(e) => error_body(e),
    }
}

async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    match dispatch(&state.allocation_channel, |response| {
        AllocationRequest::ListServices { response }
    })
    .await
    {
        Ok(services) => (StatusCode::OK, Json(json!(services))),
        Err(e) => error_body(e),
    }
}

async fn request_new_deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewDeposit>,
) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.deposit_channel, |response| DepositRequest::Initiate {
        auth,
        amount: req.amount,
        method: req.method,
        phone_number: req.phone_number,
        response,
    })
    .await
    {
        Ok(payment_link) => (StatusCode::OK, Json(json!({ "paymentLink": payment_link }))),
        Err(e) => error_body(e),
    }
}

async fn list_deposits(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.deposit_channel, |response| DepositRequest::List {
        user_id: auth.uid,
        response,
    })
    .await
    {
        Ok(deposits) => (StatusCode::OK, Json(json!(deposits))),
        Err(e) => error_body(e),
    }
}

#[derive(Deserialize)]
struct NotifyPayload {
    transaction_id: String,
}

/// Gateway-originated settlement notification. Unauthenticated by design;
/// the handler trusts nothing but the gateway's own check endpoint.
async fn cinetpay_notify(
    State(state): State<AppState>,
    Json(payload): Json<NotifyPayload>,
) -> impl IntoResponse {
    match dispatch(&state.deposit_channel, |response| DepositRequest::Confirm {
        transaction_reference: payload.transaction_id,
        response,
    })
    .await
    {
        Ok(SettlementOutcome::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Transaction not found" })),
        ),
        Ok(SettlementOutcome::Unsettled(status)) => {
            log::info!("Deposit not settled by gateway yet: {}", status);
            (
                StatusCode::OK,
                Json(json!({ "message": "Notification processed" })),
            )
        }
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "message": "Notification processed" })),
        ),
        Err(e) => error_body(e),
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    transaction_id: String,
}

async fn deposit_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    if let Err(e) = authenticate(&state, &headers).await {
        return error_body(e);
    }

    match dispatch(&state.deposit_channel, |response| {
        DepositRequest::CheckStatus {
            transaction_reference: query.transaction_id,
            response,
        }
    })
    .await
    {
        Ok(status) => (StatusCode::OK, Json(json!({ "status": status }))),
        Err(e) => error_body(e),
    }
}

async fn allocate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewAllocation>,
) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.allocation_channel, |response| {
        AllocationRequest::Commit {
            user_id: auth.uid,
            service_id: req.service_id,
            response,
        }
    })
    .await
    {
        Ok(allocation) => (StatusCode::CREATED, Json(json!(allocation))),
        Err(e) => error_body(e),
    }
}

async fn list_allocations(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.allocation_channel, |response| {
        AllocationRequest::List {
            user_id: auth.uid,
            response,
        }
    })
    .await
    {
        Ok(allocations) => (StatusCode::OK, Json(json!(allocations))),
        Err(e) => error_body(e),
    }
}

async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewWithdrawal>,
) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.withdrawal_channel, |response| {
        WithdrawalRequest::Request {
            user_id: auth.uid,
            amount: req.amount,
            method: req.method,
            account_info: req.account_info,
            response,
        }
    })
    .await
    {
        Ok(withdrawal) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Withdrawal request submitted",
                "withdrawal": withdrawal,
            })),
        ),
        Err(e) => error_body(e),
    }
}

async fn list_withdrawals(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.withdrawal_channel, |response| {
        WithdrawalRequest::List {
            user_id: auth.uid,
            response,
        }
    })
    .await
    {
        Ok(withdrawals) => (StatusCode::OK, Json(json!(withdrawals))),
        Err(e) => error_body(e),
    }
}

async fn referral_summary(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.referral_channel, |response| {
        ReferralRequest::Summary {
            user_id: auth.uid,
            response,
        }
    })
    .await
    {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(e) => error_body(e),
    }
}

async fn claim_referral_bonus(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let auth = match authenticate(&state, &headers).await {
        Ok(auth) => auth,
        Err(e) => return error_body(e),
    };

    match dispatch(&state.referral_channel, |response| ReferralRequest::Claim {
        user_id: auth.uid,
        response,
    })
    .await
    {
        Ok(credited) => (StatusCode::OK, Json(json!({ "credited": credited }))),
        Err(e) => error_body(e),
    }
}

pub async fn start_http_server(
    bind: &str,
    identity: IdentityApi,
    user_channel: mpsc::Sender<UserRequest>,
    deposit_channel: mpsc::Sender<DepositRequest>,
    allocation_channel: mpsc::Sender<AllocationRequest>,
    withdrawal_channel: mpsc::Sender<WithdrawalRequest>,
    referral_channel: mpsc::Sender<ReferralRequest>,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        identity: Arc::new(identity),
        user_channel,
        deposit_channel,
        allocation_channel,
        withdrawal_channel,
        referral_channel,
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/users", post(register_profile))
        .route("/api/user/balance", get(get_balance))
        .route("/api/services", get(list_services))
        .route("/api/deposit", post(request_new_deposit))
        .route("/api/deposits", get(list_deposits))
        .route("/api/deposit/status", get(deposit_status))
        .route("/api/cinetpay-notify", post(cinetpay_notify))
        .route("/api/allocate", post(allocate))
        .route("/api/allocations", get(list_allocations))
        .route("/api/withdraw", post(withdraw))
        .route("/api/withdrawals", get(list_withdrawals))
        .route("/api/referrals", get(referral_summary))
        .route("/api/referrals/claim", post(claim_referral_bonus))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn missing_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn non_bearer_scheme_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn empty_token_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
