use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Mtn,
    Orange,
    Card,
    Crypto,
}

impl PaymentMethod {
    /// CinetPay channel group for the checkout session.
    pub fn channels(&self) -> &'static str {
        match self {
            PaymentMethod::Mtn | PaymentMethod::Orange => "MOBILE_MONEY",
            PaymentMethod::Card => "CREDIT_CARD",
            PaymentMethod::Crypto => "WALLET",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "deposit_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub method: PaymentMethod,
    pub phone_number: Option<String>,
    pub status: DepositStatus,
    pub transaction_reference: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeposit {
    pub amount: i64,
    pub method: PaymentMethod,
    pub phone_number: Option<String>,
}

/// Result of processing a gateway settlement notification.
#[derive(Clone, Debug)]
pub enum SettlementOutcome {
    /// Balance was credited exactly once for this reference.
    Credited { user_id: String, amount: i64 },
    /// A previous notification already settled this deposit.
    AlreadyCompleted,
    /// The gateway has not accepted the payment; deposit stays pending.
    Unsettled(String),
    /// No deposit exists for the reference.
    NotFound,
}
