use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub balance: i64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Body of the profile-provisioning endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub referral_code: Option<String>,
}

/// Identity asserted by the external identity provider for a bearer token.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
}
