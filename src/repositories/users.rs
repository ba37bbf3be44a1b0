use crate::models::users::{AuthUser, User};

use anyhow::bail;
use sqlx::PgPool;
use uuid::Uuid;

const REFERRAL_CODE_LEN: usize = 6;
const REFERRAL_CODE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Create the ledger profile for an identity-provider user.
    ///
    /// Idempotent per uid: a second call returns the existing row. The
    /// referral code is regenerated on unique-constraint collision.
    pub async fn insert_profile(
        &self,
        auth: &AuthUser,
        referral_code: Option<&str>,
    ) -> Result<User, anyhow::Error> {
        if let Some(user) = self.get_user_by_id(&auth.uid).await? {
            return Ok(user);
        }

        let referred_by = match referral_code {
            Some(code) => {
                let referrer: Option<String> =
                    sqlx::query_scalar("SELECT id FROM users WHERE referral_code = $1")
                        .bind(code)
                        .fetch_optional(&self.conn)
                        .await?;
                match referrer {
                    Some(ref referrer_id) if *referrer_id != auth.uid => Some(code.to_string()),
                    _ => None,
                }
            }
            None => None,
        };

        let email = auth.email.clone().unwrap_or_default();

        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();

            let inserted = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (id, email, balance, referral_code, referred_by)
                VALUES ($1, $2, 0, $3, $4)
                ON CONFLICT (id) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(&auth.uid)
            .bind(&email)
            .bind(&code)
            .bind(&referred_by)
            .fetch_optional(&self.conn)
            .await;

            match inserted {
                Ok(Some(user)) => return Ok(user),
                Ok(None) => {
                    // Lost the insert race for this uid; the winner's row is authoritative.
                    match self.get_user_by_id(&auth.uid).await? {
                        Some(user) => return Ok(user),
                        None => bail!("User {} vanished during profile creation", auth.uid),
                    }
                }
                Err(e) if is_unique_violation(&e, "users_referral_code_key") => continue,
                Err(e) => return Err(e.into()),
            }
        }

        bail!("Could not generate a unique referral code")
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    /// Referred users counted as active: at least one completed deposit or
    /// one allocation.
    pub async fn count_active_referrals(&self, referral_code: &str) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users u
            WHERE u.referred_by = $1
              AND (EXISTS (SELECT 1 FROM deposits d
                           WHERE d.user_id = u.id AND d.status = 'completed')
                OR EXISTS (SELECT 1 FROM allocations a WHERE a.user_id = u.id))
            "#,
        )
        .bind(referral_code)
        .fetch_one(&self.conn)
        .await?;

        Ok(count)
    }
}

fn generate_referral_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..REFERRAL_CODE_LEN].to_uppercase()
}

pub(crate) fn is_unique_violation(error: &sqlx::Error, constraint: &str) -> bool {
    match error {
        sqlx::Error::Database(db) => db.constraint() == Some(constraint),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_code_shape() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn referral_codes_vary() {
        let a = generate_referral_code();
        let b = generate_referral_code();
        // v4 uuids make a 6-char collision vanishingly unlikely in one pair
        assert_ne!(a, b);
    }
}
