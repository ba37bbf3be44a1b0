use crate::models::cinetpay::CustomerInfo;
use crate::models::deposits::{Deposit, PaymentMethod, SettlementOutcome};
use crate::models::users::AuthUser;
use crate::settings;

use sqlx::PgPool;
use uuid::Uuid;

mod cinetpay;

pub struct DepositRepository {
    cinetpay_api: cinetpay::CinetpayApi,
    conn: PgPool,
}

impl DepositRepository {
    pub fn new(conn: PgPool, gateway: settings::Cinetpay) -> Self {
        let cinetpay_api = cinetpay::CinetpayApi::new(
            gateway.api_key,
            gateway.site_id,
            gateway.url,
            gateway.notify_url,
            gateway.return_url,
        );

        DepositRepository { cinetpay_api, conn }
    }

    /// Insert a pending deposit with a fresh unique transaction reference.
    /// The balance is untouched until the gateway confirms settlement.
    pub async fn create_pending(
        &self,
        user_id: &str,
        amount: i64,
        method: PaymentMethod,
        phone_number: Option<&str>,
    ) -> Result<Deposit, anyhow::Error> {
        let deposit_id = Uuid::new_v4().hyphenated().to_string();
        let reference = format!("TX-{}", Uuid::new_v4().simple());

        let deposit = sqlx::query_as::<_, Deposit>(
            r#"
            INSERT INTO deposits (id, user_id, amount, method, phone_number, status, transaction_reference)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(&deposit_id)
        .bind(user_id)
        .bind(amount)
        .bind(method)
        .bind(phone_number)
        .bind(&reference)
        .fetch_one(&self.conn)
        .await?;

        Ok(deposit)
    }

    /// Open the hosted checkout session for a pending deposit.
    pub async fn payment_link(
        &self,
        deposit: &Deposit,
        auth: &AuthUser,
    ) -> Result<String, anyhow::Error> {
        let customer = CustomerInfo {
            name: auth.name.clone().unwrap_or_default(),
            email: auth.email.clone().unwrap_or_default(),
            phone_number: deposit.phone_number.clone().unwrap_or_default(),
        };

        let session = self
            .cinetpay_api
            .create_payment(
                &deposit.transaction_reference,
                deposit.amount,
                deposit.method.channels(),
                &customer,
            )
            .await?;

        Ok(session.payment_url)
    }

    pub async fn get_by_reference(
        &self,
        transaction_reference: &str,
    ) -> Result<Option<Deposit>, anyhow::Error> {
        let deposit = sqlx::query_as::<_, Deposit>(
            "SELECT * FROM deposits WHERE transaction_reference = $1",
        )
        .bind(transaction_reference)
        .fetch_optional(&self.conn)
        .await?;

        Ok(deposit)
    }

    pub async fn check_gateway(
        &self,
        transaction_reference: &str,
    ) -> Result<String, anyhow::Error> {
        self.cinetpay_api.check_payment(transaction_reference).await
    }

    /// Settle a gateway-accepted deposit: flip `pending -> completed` and
    /// credit the balance in one transaction.
    ///
    /// The conditional status flip is the idempotency guard; a replayed
    /// notification finds zero rows to flip and credits nothing.
    pub async fn settle(&self, deposit: &Deposit) -> Result<SettlementOutcome, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let flipped = sqlx::query(
            r#"
            UPDATE deposits SET status = 'completed'
            WHERE transaction_reference = $1 AND status <> 'completed'
            "#,
        )
        .bind(&deposit.transaction_reference)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SettlementOutcome::AlreadyCompleted);
        }

        let credited = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
            .bind(deposit.amount)
            .bind(&deposit.user_id)
            .execute(&mut *tx)
            .await?;

        if credited.rows_affected() == 0 {
            tx.rollback().await?;
            anyhow::bail!(
                "User {} missing while settling deposit {}",
                deposit.user_id,
                deposit.transaction_reference
            );
        }

        tx.commit().await?;

        Ok(SettlementOutcome::Credited {
            user_id: deposit.user_id.clone(),
            amount: deposit.amount,
        })
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Deposit>, anyhow::Error> {
        let deposits = sqlx::query_as::<_, Deposit>(
            "SELECT * FROM deposits WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(deposits)
    }
}
