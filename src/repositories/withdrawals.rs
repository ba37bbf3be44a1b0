use crate::models::deposits::PaymentMethod;
use crate::models::withdrawals::Withdrawal;

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct WithdrawalRepository {
    conn: PgPool,
}

impl WithdrawalRepository {
    pub fn new(conn: PgPool) -> Self {
        WithdrawalRepository { conn }
    }

    /// Debit the balance and create the pending withdrawal as one
    /// transaction. Returns `None` when the conditional debit finds
    /// insufficient balance; nothing is mutated in that case.
    pub async fn insert_withdrawal(
        &self,
        user_id: &str,
        amount: i64,
        method: PaymentMethod,
        account_info: &str,
    ) -> Result<Option<Withdrawal>, anyhow::Error> {
        let withdrawal_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        let debited =
            sqlx::query("UPDATE users SET balance = balance - $1 WHERE id = $2 AND balance >= $1")
                .bind(amount)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

        if debited.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (id, user_id, amount, method, account_info, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(&withdrawal_id)
        .bind(user_id)
        .bind(amount)
        .bind(method)
        .bind(account_info)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(withdrawal))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Withdrawal>, anyhow::Error> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(withdrawals)
    }
}
