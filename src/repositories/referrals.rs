use crate::models::referrals::{ClaimItem, ReferralBonus, ReferredActivity};

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ReferralRepository {
    conn: PgPool,
}

impl ReferralRepository {
    pub fn new(conn: PgPool) -> Self {
        ReferralRepository { conn }
    }

    /// Activity of every user referred by the given code: total completed
    /// deposits (the bonus basis) and whether any allocation exists.
    pub async fn referred_activity(
        &self,
        referral_code: &str,
    ) -> Result<Vec<ReferredActivity>, anyhow::Error> {
        let rows = sqlx::query_as::<_, ReferredActivity>(
            r#"
            SELECT u.id, u.email, u.created_at,
                   COALESCE((SELECT SUM(d.amount) FROM deposits d
                             WHERE d.user_id = u.id AND d.status = 'completed'), 0)::BIGINT
                       AS total_deposited,
                   EXISTS (SELECT 1 FROM allocations a WHERE a.user_id = u.id)
                       AS has_allocation
            FROM users u
            WHERE u.referred_by = $1
            ORDER BY u.created_at DESC
            "#,
        )
        .bind(referral_code)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows)
    }

    /// Amounts already paid out per referred user.
    pub async fn claimed_amounts(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<ReferralBonus>, anyhow::Error> {
        let rows = sqlx::query_as::<_, ReferralBonus>(
            "SELECT referred_id, claimed_amount FROM referral_bonuses WHERE referrer_id = $1",
        )
        .bind(referrer_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows)
    }

    /// Raise the claim ledger and credit the referrer in one transaction.
    ///
    /// Each ledger upsert only applies while it increases `claimed_amount`,
    /// so a racing claim that already paid a referral contributes nothing
    /// here. Returns the amount actually credited.
    pub async fn apply_claim(
        &self,
        referrer_id: &str,
        items: &[ClaimItem],
    ) -> Result<i64, anyhow::Error> {
        let mut tx = self.conn.begin().await?;
        let mut credited: i64 = 0;

        for item in items {
            let bonus_id = Uuid::new_v4().hyphenated().to_string();
            let applied = sqlx::query(
                r#"
                INSERT INTO referral_bonuses (id, referrer_id, referred_id, claimed_amount)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (referrer_id, referred_id) DO UPDATE
                SET claimed_amount = EXCLUDED.claimed_amount, claimed_at = now()
                WHERE referral_bonuses.claimed_amount < EXCLUDED.claimed_amount
                "#,
            )
            .bind(&bonus_id)
            .bind(referrer_id)
            .bind(&item.referred_id)
            .bind(item.new_total)
            .execute(&mut *tx)
            .await?;

            if applied.rows_affected() > 0 {
                credited += item.delta;
            }
        }

        if credited > 0 {
            let updated = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
                .bind(credited)
                .bind(referrer_id)
                .execute(&mut *tx)
                .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                anyhow::bail!("User {} missing while crediting referral bonus", referrer_id);
            }
        }

        tx.commit().await?;

        Ok(credited)
    }
}
