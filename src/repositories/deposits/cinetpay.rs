use crate::models::cinetpay::{CustomerInfo, PaymentSession};

use anyhow::bail;
use serde_json::json;
use std::time::Duration;

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct CinetpayApi {
    api_key: String,
    site_id: String,
    url: String,
    notify_url: String,
    return_url: String,
    client: reqwest::Client,
}

impl CinetpayApi {
    pub fn new(
        api_key: String,
        site_id: String,
        url: String,
        notify_url: String,
        return_url: String,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .expect("Could not build HTTP client.");

        Self {
            api_key,
            site_id,
            url,
            notify_url,
            return_url,
            client,
        }
    }

    /// Open a hosted checkout session for a transaction reference.
    pub async fn create_payment(
        &self,
        transaction_reference: &str,
        amount: i64,
        channels: &str,
        customer: &CustomerInfo,
    ) -> Result<PaymentSession, anyhow::Error> {
        let payload = json!({
            "apikey": self.api_key,
            "site_id": self.site_id,
            "transaction_id": transaction_reference,
            "amount": amount,
            "currency": "XAF",
            "description": "Apple Allocations deposit",
            "customer_name": customer.name,
            "customer_email": customer.email,
            "customer_phone_number": customer.phone_number,
            "channels": channels,
            "notify_url": self.notify_url,
            "return_url": self.return_url,
        });

        let response = self
            .client
            .post(format!("{}/v2/payment", self.url))
            .json(&payload)
            .send()
            .await?
            .text()
            .await?;

        let response_json: serde_json::Value = serde_json::from_str(&response)?;
        let data = match response_json.get("data") {
            Some(data) if !data.is_null() => data,
            _ => bail!("CinetPay: bad payment response format"),
        };

        match data.get("payment_url").and_then(|u| u.as_str()) {
            Some(payment_url) => Ok(PaymentSession {
                payment_url: payment_url.to_string(),
                payment_token: data
                    .get("payment_token")
                    .and_then(|t| t.as_str())
                    .map(String::from),
            }),
            None => bail!("CinetPay: payment response missing payment_url"),
        }
    }

    /// Ask the gateway for the settled status of a transaction reference.
    pub async fn check_payment(
        &self,
        transaction_reference: &str,
    ) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .get(format!("{}/v2/payment/check", self.url))
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("site_id", self.site_id.as_str()),
                ("transaction_id", transaction_reference),
            ])
            .send()
            .await?
            .text()
            .await?;

        let response_json: serde_json::Value = serde_json::from_str(&response)?;
        match response_json
            .get("data")
            .and_then(|d| d.get("status"))
            .and_then(|s| s.as_str())
        {
            Some(status) => Ok(status.to_string()),
            None => bail!("CinetPay: check response missing status"),
        }
    }
}
