use crate::models::users::AuthUser;

use anyhow::bail;
use serde_json::json;
use std::time::Duration;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Token-verification adapter for the external identity provider.
pub struct IdentityApi {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl IdentityApi {
    pub fn new(url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .expect("Could not build HTTP client.");

        Self {
            url,
            api_key,
            client,
        }
    }

    /// Exchange a bearer token for the identity it asserts. `Ok(None)` means
    /// the provider rejected the token; transport failures surface as errors.
    pub async fn verify_token(&self, token: &str) -> Result<Option<AuthUser>, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/v1/token/verify", self.url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "token": token }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }

        let body: serde_json::Value = response.error_for_status()?.json().await?;
        match body.get("uid").and_then(|v| v.as_str()) {
            Some(uid) => Ok(Some(AuthUser {
                uid: uid.to_string(),
                email: body.get("email").and_then(|v| v.as_str()).map(String::from),
                name: body.get("name").and_then(|v| v.as_str()).map(String::from),
            })),
            None => bail!("Identity: bad verification response format"),
        }
    }
}
