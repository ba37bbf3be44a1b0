use serde::{Deserialize, Serialize};

/// Hosted checkout session returned by the CinetPay payment API.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PaymentSession {
    pub payment_url: String,
    pub payment_token: Option<String>,
}

/// Customer fields forwarded to the checkout session.
#[derive(Clone, Debug)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone_number: String,
}
