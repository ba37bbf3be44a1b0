use crate::models::allocations::{Allocation, AllocationStatus};
use crate::repositories::allocations::AllocationRepository;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::{Connection, PgPool};

/// Advisory-lock key guarding the accrual cycle; one execution at a time
/// across every instance sharing the store.
const PAYOUT_LOCK_KEY: i64 = 0x4150_504c_4f43;

/// Daily accrual engine.
///
/// Walks every active allocation once per day, credits whole-day earnings
/// since each allocation's watermark and completes allocations whose term
/// has elapsed. Correctness under crashes and re-runs derives from the
/// watermark alone: settled allocations compute nothing owed next time.
#[derive(Clone)]
pub struct PayoutScheduler {
    pool: PgPool,
    repository: AllocationRepository,
    hour_utc: u32,
    page_size: i64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CycleStats {
    pub settled: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl PayoutScheduler {
    pub fn new(pool: PgPool, hour_utc: u32, page_size: i64) -> Self {
        let repository = AllocationRepository::new(pool.clone());

        PayoutScheduler {
            pool,
            repository,
            hour_utc: hour_utc.min(23),
            page_size: page_size.max(1),
        }
    }

    pub fn start_daily_task(&self) {
        let scheduler = self.clone();

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_run_at(now, scheduler.hour_utc);
                log::info!("Next payout cycle at {}", next);

                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                match scheduler.run_cycle_locked().await {
                    Ok(Some(stats)) => log::info!("Payout cycle finished: {:?}", stats),
                    Ok(None) => log::warn!("Payout cycle already running elsewhere, skipped."),
                    Err(e) => log::error!("Payout cycle failed: {}", e),
                }
            }
        });

        log::info!("Payout scheduler started");
    }

    /// Run one cycle under the advisory lock. Returns `None` when another
    /// cycle currently holds the lock.
    pub async fn run_cycle_locked(&self) -> Result<Option<CycleStats>, anyhow::Error> {
        let mut lock_conn = self.pool.acquire().await?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(PAYOUT_LOCK_KEY)
            .fetch_one(&mut *lock_conn)
            .await?;
        if !locked {
            return Ok(None);
        }

        let result = self.run_cycle(Utc::now()).await;

        let unlocked: Result<bool, sqlx::Error> = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(PAYOUT_LOCK_KEY)
            .fetch_one(&mut *lock_conn)
            .await;
        if let Err(e) = unlocked {
            // The lock is session-scoped; closing the connection releases it.
            log::warn!("Could not release payout lock, closing connection: {}", e);
            let _ = lock_conn.detach().close().await;
        }

        result.map(Some)
    }

    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleStats, anyhow::Error> {
        let mut stats = CycleStats::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .repository
                .active_page(cursor.as_deref(), self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|allocation| allocation.id.clone());

            for allocation in &page {
                let accrual = match accrue(allocation, now) {
                    Some(accrual) => accrual,
                    None => {
                        stats.skipped += 1;
                        continue;
                    }
                };

                match self
                    .repository
                    .settle(allocation, accrual.gain, accrual.completes, now)
                    .await
                {
                    Ok(true) => {
                        stats.settled += 1;
                        if accrual.completes {
                            stats.completed += 1;
                        }
                        log::debug!(
                            "Allocation {} credited {} over {} day(s)",
                            allocation.id,
                            accrual.gain,
                            accrual.days
                        );
                    }
                    Ok(false) => stats.skipped += 1,
                    // One bad record never aborts the batch.
                    Err(e) => {
                        stats.failed += 1;
                        log::error!("Could not settle allocation {}: {}", allocation.id, e);
                    }
                }
            }

            if (page.len() as i64) < self.page_size {
                break;
            }
        }

        Ok(stats)
    }
}

/// Earnings owed to one allocation as of `now`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Accrual {
    pub gain: i64,
    pub days: i64,
    pub completes: bool,
}

/// Whole-day accrual since the watermark, clamped to the allocation's term.
///
/// Returns `None` when nothing is owed and no status change is due:
/// completed or malformed allocations, and allocations whose watermark is
/// less than one full day old.
pub(crate) fn accrue(allocation: &Allocation, now: DateTime<Utc>) -> Option<Accrual> {
    if allocation.status != AllocationStatus::Active {
        return None;
    }
    if allocation.daily_return <= 0 {
        return None;
    }

    let term_end = allocation
        .duration_days
        .map(|days| allocation.created_at + Duration::days(days));
    let window_end = match term_end {
        Some(end) => now.min(end),
        None => now,
    };

    let days = (window_end - allocation.last_payout_at).num_days();
    let completes = term_end.is_some_and(|end| now >= end);

    if days <= 0 {
        // Nothing left to credit; the terminal flip may still be due.
        if completes {
            return Some(Accrual {
                gain: 0,
                days: 0,
                completes: true,
            });
        }
        return None;
    }

    Some(Accrual {
        gain: allocation.daily_return * days,
        days,
        completes,
    })
}

fn next_run_at(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour_utc.min(23), 0, 0)
        .expect("valid wall-clock hour");
    let candidate = Utc.from_utc_datetime(&today);

    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn allocation(daily_return: i64, duration_days: Option<i64>) -> Allocation {
        let created_at = base_time();
        Allocation {
            id: "alloc-1".to_string(),
            user_id: "user-1".to_string(),
            service_id: "trading-bot-pro".to_string(),
            invested_amount: 2500,
            daily_return,
            duration_days,
            total_earned: 0,
            status: AllocationStatus::Active,
            created_at,
            last_payout_at: created_at,
        }
    }

    #[test]
    fn whole_day_buckets_floor_fractional_days() {
        let alloc = allocation(100, None);
        let now = base_time() + Duration::hours(60); // 2.5 days

        let accrual = accrue(&alloc, now).unwrap();
        assert_eq!(accrual.days, 2);
        assert_eq!(accrual.gain, 200);
        assert!(!accrual.completes);
    }

    #[test]
    fn nothing_owed_within_the_first_day() {
        let alloc = allocation(100, None);
        let now = base_time() + Duration::hours(12);

        assert!(accrue(&alloc, now).is_none());
    }

    #[test]
    fn zero_daily_return_is_ignored() {
        let alloc = allocation(0, Some(30));
        let now = base_time() + Duration::days(5);

        assert!(accrue(&alloc, now).is_none());
    }

    #[test]
    fn completed_allocations_are_ignored() {
        let mut alloc = allocation(100, Some(30));
        alloc.status = AllocationStatus::Completed;
        let now = base_time() + Duration::days(40);

        assert!(accrue(&alloc, now).is_none());
    }

    #[test]
    fn accrual_is_clamped_to_the_term() {
        // 30-day term at 100/day, first cycle a day late: exactly the full
        // term's 3000 is owed, not 3100.
        let alloc = allocation(100, Some(30));
        let now = base_time() + Duration::days(31);

        let accrual = accrue(&alloc, now).unwrap();
        assert_eq!(accrual.days, 30);
        assert_eq!(accrual.gain, 3000);
        assert!(accrual.completes);
    }

    #[test]
    fn term_completes_exactly_at_the_boundary() {
        let alloc = allocation(100, Some(30));
        let now = base_time() + Duration::days(30);

        let accrual = accrue(&alloc, now).unwrap();
        assert_eq!(accrual.gain, 3000);
        assert!(accrual.completes);
    }

    #[test]
    fn mid_term_payouts_then_completion() {
        let mut alloc = allocation(100, Some(30));
        alloc.last_payout_at = base_time() + Duration::days(10);
        alloc.total_earned = 1000;
        let now = base_time() + Duration::days(40);

        let accrual = accrue(&alloc, now).unwrap();
        assert_eq!(accrual.days, 20);
        assert_eq!(accrual.gain, 2000);
        assert!(accrual.completes);
    }

    #[test]
    fn open_ended_allocations_never_complete() {
        let alloc = allocation(50, None);
        let now = base_time() + Duration::days(400);

        let accrual = accrue(&alloc, now).unwrap();
        assert_eq!(accrual.days, 400);
        assert_eq!(accrual.gain, 20_000);
        assert!(!accrual.completes);
    }

    #[test]
    fn elapsed_term_with_nothing_owed_still_flips_status() {
        let mut alloc = allocation(100, Some(30));
        alloc.last_payout_at = base_time() + Duration::days(31);
        let now = base_time() + Duration::days(32);

        let accrual = accrue(&alloc, now).unwrap();
        assert_eq!(accrual.gain, 0);
        assert!(accrual.completes);
    }

    #[test]
    fn settled_watermark_owes_nothing_on_rerun() {
        let mut alloc = allocation(100, None);
        let now = base_time() + Duration::days(3);
        alloc.last_payout_at = now;

        assert!(accrue(&alloc, now).is_none());
    }

    #[test]
    fn next_run_is_today_before_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 1, 30, 0).unwrap();
        let next = next_run_at(now, 3);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn next_run_is_tomorrow_after_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 3, 0, 0).unwrap();
        let next = next_run_at(now, 3);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 2, 3, 0, 0).unwrap());
    }
}
