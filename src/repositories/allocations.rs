use crate::models::allocations::{Allocation, AllocationStatus};
use crate::models::catalog::Service;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct AllocationRepository {
    conn: PgPool,
}

impl AllocationRepository {
    pub fn new(conn: PgPool) -> Self {
        AllocationRepository { conn }
    }

    /// Commit balance to a service: conditional debit plus allocation insert
    /// in one transaction. Returns `None` when the balance does not cover the
    /// price; nothing is mutated in that case.
    pub async fn commit_allocation(
        &self,
        user_id: &str,
        service: &Service,
    ) -> Result<Option<Allocation>, anyhow::Error> {
        let allocation_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        let debited =
            sqlx::query("UPDATE users SET balance = balance - $1 WHERE id = $2 AND balance >= $1")
                .bind(service.price)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

        if debited.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let allocation = sqlx::query_as::<_, Allocation>(
            r#"
            INSERT INTO allocations
            (id, user_id, service_id, invested_amount, daily_return, duration_days,
             total_earned, status, created_at, last_payout_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, 'active', now(), now())
            RETURNING *
            "#,
        )
        .bind(&allocation_id)
        .bind(user_id)
        .bind(&service.id)
        .bind(service.price)
        .bind(service.daily_return)
        .bind(service.duration_days)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(allocation))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Allocation>, anyhow::Error> {
        let allocations = sqlx::query_as::<_, Allocation>(
            "SELECT * FROM allocations WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(allocations)
    }

    pub async fn count_for_user(&self, user_id: &str) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM allocations WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.conn)
            .await?;

        Ok(count)
    }

    /// One page of active allocations, keyset-ordered by id. Completed
    /// allocations never enter the accrual cycle.
    pub async fn active_page(
        &self,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Allocation>, anyhow::Error> {
        let page = sqlx::query_as::<_, Allocation>(
            r#"
            SELECT * FROM allocations
            WHERE status = 'active' AND ($1::TEXT IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(page)
    }

    /// Apply one allocation's accrual as a single transaction: advance the
    /// watermark, bump `total_earned`, flip the status when the term elapsed,
    /// and credit the user's balance.
    ///
    /// The `last_payout_at = <observed>` predicate makes the read-compute-write
    /// an atomic unit: if anything advanced the watermark since the page was
    /// read, zero rows match and the whole update is skipped (`Ok(false)`).
    pub async fn settle(
        &self,
        allocation: &Allocation,
        gain: i64,
        completes: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let status = if completes {
            AllocationStatus::Completed
        } else {
            AllocationStatus::Active
        };

        let mut tx = self.conn.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE allocations
            SET total_earned = total_earned + $1, last_payout_at = $2, status = $3
            WHERE id = $4 AND status = 'active' AND last_payout_at = $5
            "#,
        )
        .bind(gain)
        .bind(now)
        .bind(status)
        .bind(&allocation.id)
        .bind(allocation.last_payout_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if gain > 0 {
            let credited = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
                .bind(gain)
                .bind(&allocation.user_id)
                .execute(&mut *tx)
                .await?;

            if credited.rows_affected() == 0 {
                tx.rollback().await?;
                anyhow::bail!(
                    "User {} missing while settling allocation {}",
                    allocation.user_id,
                    allocation.id
                );
            }
        }

        tx.commit().await?;

        Ok(true)
    }
}
