//! Retry Sweeper
//!
//! A payout only runs when a user links a wallet. Payouts that were released
//! (operator wallet empty, settings missing, RPC down) would otherwise wait for
//! the next link event, so the sweeper periodically re-triggers every unpaid
//! referral whose referrer and referred user both linked a wallet.
//!
//! Each cycle continues after the last referral the previous cycle handled and
//! wraps around at the end, so rows that keep getting skipped or released
//! cannot starve newer ones.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::SweeperConfig;
use crate::domain::{PayoutOutcome, PendingReferral, ReferralId};
use crate::errors::Result;
use crate::referral_payout::ReferralPayoutService;
use crate::repository::ReferralRepository;

/// Counts for one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub candidates: usize,
    pub paid: usize,
    pub skipped: usize,
    pub released: usize,
    pub failed: usize,
}

pub struct RetrySweeper {
    referrals: Arc<dyn ReferralRepository>,
    payouts: Arc<ReferralPayoutService>,
    config: SweeperConfig,
    /// Highest referral id handled by the previous cycle
    cursor: AtomicI32,
}

impl RetrySweeper {
    pub fn new(
        referrals: Arc<dyn ReferralRepository>,
        payouts: Arc<ReferralPayoutService>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            referrals,
            payouts,
            config,
            cursor: AtomicI32::new(0),
        }
    }

    /// Main sweep loop
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.interval_seconds);

        info!(
            interval_seconds = self.config.interval_seconds,
            batch_size = self.config.batch_size,
            "Retry sweeper starting"
        );

        loop {
            let cycle_start = std::time::Instant::now();

            match self.run_cycle().await {
                Ok(summary) => {
                    info!(
                        candidates = summary.candidates,
                        paid = summary.paid,
                        skipped = summary.skipped,
                        released = summary.released,
                        failed = summary.failed,
                        cycle_duration_ms = cycle_start.elapsed().as_millis() as u64,
                        "Sweep cycle completed"
                    );
                }
                Err(e) => error!(error = %e, "Sweep cycle failed"),
            }

            sleep(interval).await;
        }
    }

    /// One pass over the next batch of pending referrals, processed one at a time
    pub async fn run_cycle(&self) -> Result<SweepSummary> {
        let cycle_id = Uuid::new_v4();
        let after_id = self.cursor.load(Ordering::SeqCst);

        let mut pending = self.fetch_pending(after_id).await?;
        if pending.is_empty() && after_id > 0 {
            // End of the table, start over from the oldest referral
            pending = self.fetch_pending(0).await?;
        }

        let next_cursor = match pending.last() {
            Some(last) if pending.len() as i64 >= self.config.batch_size => last.id,
            _ => 0,
        };
        self.cursor.store(next_cursor, Ordering::SeqCst);

        let mut summary = SweepSummary {
            candidates: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            debug!(%cycle_id, "No pending referral payouts");
            return Ok(summary);
        }

        info!(
            %cycle_id,
            candidates = pending.len(),
            after_id,
            next_cursor,
            "Retrying pending referral payouts"
        );

        for PendingReferral { id: referral_id, referred_id } in pending {
            match self.payouts.process_referral_reward_for_user(referred_id).await {
                Ok(PayoutOutcome::Paid { .. }) => summary.paid += 1,
                Ok(PayoutOutcome::Skipped(_)) => summary.skipped += 1,
                Ok(PayoutOutcome::Released { .. }) => summary.released += 1,
                Err(e) => {
                    // One bad row must not stop the rest of the cycle
                    error!(%cycle_id, referral_id, user_id = referred_id, error = %e, "Payout retry failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn fetch_pending(&self, after_id: ReferralId) -> Result<Vec<PendingReferral>> {
        self.referrals
            .find_pending_referrals(after_id, self.config.batch_size)
            .await
    }
}
