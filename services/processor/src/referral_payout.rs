//! Referral reward payout orchestration
//!
//! Pays the referrer and referee of a referral exactly once. The whole run
//! happens inside one database transaction that holds the referral row lock
//! across the chain calls:
//!
//! 1. lock the referred user's referral if its txid is NULL or PROCESSING
//! 2. require linked wallets for both parties
//! 3. re-read the txid (another run may have finished in between)
//! 4. write PROCESSING (the claim)
//! 5-9. resolve chain, contract, rewards, operator key, check the RPC chain
//!    id, then send
//! 10. success: store the tx hash
//! 11. any failure after the claim: reset txid to NULL so a later run can retry
//!
//! If the transaction times out or errors, everything rolls back, the claim
//! included.
//!
//! With an explorer configured, a paid payout is followed by a detached lookup
//! of the referee's first transaction, logged for the audit trail.

use alloy::primitives::{Address, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chain_client::ChainConnector;
use crate::chain_registry::ChainRegistry;
use crate::domain::{PayoutOutcome, Referral, ReferralId, SkipReason, UserId, UserWallet};
use crate::errors::{PayoutError, Result};
use crate::explorer_client::{ExplorerClient, LookupOutcome};
use crate::repository::{PayoutStore, PayoutTransaction};
use crate::reward_sender::send_referral_rewards;
use crate::reward_settings::RewardSettings;
use shared::errors::ServiceError;
use shared::{ReferralTxState, PAYOUT_TX_TIMEOUT_MS, REWARD_CHAIN_ID};

pub struct ReferralPayoutService {
    store: Arc<dyn PayoutStore>,
    chains: Arc<dyn ChainRegistry>,
    connector: Arc<dyn ChainConnector>,
    rewards: RewardSettings,
    operator_private_key: Option<String>,
    tx_timeout: Duration,
    explorer: Option<ExplorerClient>,
}

impl ReferralPayoutService {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        chains: Arc<dyn ChainRegistry>,
        connector: Arc<dyn ChainConnector>,
        rewards: RewardSettings,
        operator_private_key: Option<String>,
    ) -> Self {
        Self {
            store,
            chains,
            connector,
            rewards,
            operator_private_key,
            tx_timeout: Duration::from_millis(PAYOUT_TX_TIMEOUT_MS),
            explorer: None,
        }
    }

    pub fn with_tx_timeout(mut self, tx_timeout: Duration) -> Self {
        self.tx_timeout = tx_timeout;
        self
    }

    pub fn with_explorer(mut self, explorer: ExplorerClient) -> Self {
        self.explorer = Some(explorer);
        self
    }

    /// Pay the referral rewards for `user_id` as the referred party, if due.
    ///
    /// Called after a user links a wallet. Expected failures are logged and
    /// reported as `Released`/`Skipped`; only unexpected errors (database,
    /// timeout) are returned, and the caller should log them without failing
    /// the wallet linking itself.
    pub async fn process_referral_reward_for_user(&self, user_id: UserId) -> Result<PayoutOutcome> {
        let result = match tokio::time::timeout(self.tx_timeout, self.run_payout(user_id)).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the in-flight future dropped the transaction, which rolls it back
                error!(
                    user_id,
                    timeout_ms = self.tx_timeout.as_millis() as u64,
                    "Referral payout transaction timed out, rolled back"
                );
                Err(PayoutError::Timeout(self.tx_timeout))
            }
        };

        match &result {
            Ok(outcome) => {
                metrics::counter!("referral_payouts_total", "outcome" => outcome.label()).increment(1);
            }
            Err(e) => {
                error!(user_id, error = %e, "Referral payout failed unexpectedly");
                metrics::counter!("referral_payout_errors_total").increment(1);
            }
        }

        result
    }

    async fn run_payout(&self, user_id: UserId) -> Result<PayoutOutcome> {
        let mut tx = self.store.begin().await?;

        // 1. Candidate row, locked for the rest of the transaction
        let Some(referral) = tx.find_claimable_referral(user_id).await? else {
            debug!(user_id, "No unpaid referral for user");
            return Ok(PayoutOutcome::Skipped(SkipReason::NoUnpaidReferral));
        };
        let referral_id = referral.id;

        debug!(
            referral_id,
            referrer_id = referral.referrer_id,
            referred_id = referral.referred_id,
            state = %referral.tx_state(),
            stage = "lookup",
            "Found claimable referral"
        );

        // 2. Both parties need a wallet
        let wallets = tx
            .find_wallets(&[referral.referrer_id, referral.referred_id])
            .await?;
        let (referrer_address, referee_address) = match resolve_addresses(&referral, &wallets) {
            Ok(addresses) => addresses,
            Err(reason) => {
                info!(
                    referral_id,
                    reason = reason.as_str(),
                    stage = "wallets",
                    "Referral payout not possible yet"
                );
                return Ok(PayoutOutcome::Skipped(reason));
            }
        };

        // 3. Re-read inside the transaction
        match tx.tx_state(referral_id).await? {
            None => {
                warn!(referral_id, stage = "recheck", "Referral disappeared during payout");
                return Ok(PayoutOutcome::Skipped(SkipReason::NoUnpaidReferral));
            }
            Some(ReferralTxState::Paid(tx_hash)) => {
                info!(referral_id, tx_hash = %tx_hash, stage = "recheck", "Referral already paid");
                return Ok(PayoutOutcome::Skipped(SkipReason::AlreadyPaid));
            }
            Some(_) => {}
        }

        // 4. Claim
        tx.set_tx_state(referral_id, &ReferralTxState::Processing)
            .await?;
        debug!(referral_id, stage = "claim", "Referral claimed for payout");

        // 5-9. Everything after the claim either pays or releases
        match self
            .pay(&referral, referrer_address, referee_address)
            .await?
        {
            Ok(tx_hash) => {
                let tx_hash = tx_hash.to_string();
                tx.set_tx_state(referral_id, &ReferralTxState::Paid(tx_hash.clone()))
                    .await?;
                tx.commit().await?;

                info!(
                    referral_id,
                    tx_hash = %tx_hash,
                    stage = "finalize",
                    "Referral rewards paid"
                );
                self.spawn_first_transaction_audit(referral_id, referee_address);

                Ok(PayoutOutcome::Paid {
                    referral_id,
                    tx_hash,
                })
            }
            Err(reason) => {
                release_claim(tx, referral_id).await?;

                if reason.category.log_level() == "error" {
                    error!(
                        referral_id,
                        code = %reason.code,
                        error = %reason,
                        stage = "release",
                        "Referral payout aborted, claim released"
                    );
                } else {
                    warn!(
                        referral_id,
                        code = %reason.code,
                        error = %reason,
                        stage = "release",
                        "Referral payout aborted, claim released"
                    );
                }
                Ok(PayoutOutcome::Released {
                    referral_id,
                    reason,
                })
            }
        }
    }

    /// Look up the referee's first on-chain transaction in the background.
    /// The result is only logged; it never affects the payout.
    fn spawn_first_transaction_audit(&self, referral_id: ReferralId, referee: Address) {
        let Some(explorer) = self.explorer.clone() else {
            return;
        };

        tokio::spawn(async move {
            match explorer.find_first_transaction(&referee.to_string()).await {
                LookupOutcome::Found(first) => info!(
                    referral_id,
                    referee = %referee,
                    first_tx_hash = %first.hash,
                    first_tx_block = first.block_number,
                    first_tx_at = %first.received_at,
                    stage = "audit",
                    "Referee first transaction recorded"
                ),
                LookupOutcome::NotFound => {
                    info!(referral_id, referee = %referee, stage = "audit", "Referee has no explorer history");
                }
                LookupOutcome::Failed(message) => {
                    debug!(referral_id, referee = %referee, error = %message, stage = "audit", "Explorer lookup failed");
                }
            }
        });
    }

    /// Steps 5-9. The outer error is unexpected and aborts the transaction;
    /// the inner error is a recoverable reason to release the claim.
    async fn pay(
        &self,
        referral: &Referral,
        referrer: Address,
        referee: Address,
    ) -> Result<std::result::Result<TxHash, ServiceError>> {
        let referral_id = referral.id;

        let Some(chain) = self.chains.get_chain(REWARD_CHAIN_ID) else {
            return Ok(Err(ServiceError::chain_not_found(REWARD_CHAIN_ID)));
        };

        let Some(contract) = chain.payout_contract() else {
            return Ok(Err(ServiceError::contract_unset(&chain.id)));
        };

        let Some(rewards) = self.rewards.reward_amounts().await? else {
            return Ok(Err(ServiceError::rewards_invalid()));
        };

        let Some(private_key) = self.operator_private_key.as_deref() else {
            return Ok(Err(ServiceError::operator_key_missing()));
        };

        let client = match self.connector.connect(&chain, private_key) {
            Ok(client) => client,
            Err(e) => return Ok(Err(ServiceError::chain_client_unavailable(format!("{:#}", e)))),
        };

        // The RPC endpoint must serve the chain the contract was configured for
        match client.chain_id().await {
            Ok(chain_id) if chain_id == chain.chain_id => {}
            Ok(chain_id) => {
                return Ok(Err(ServiceError::chain_id_mismatch(chain.chain_id, chain_id)));
            }
            Err(e) => return Ok(Err(ServiceError::chain_client_unavailable(format!("{:#}", e)))),
        }

        // On-chain guard: a previous run may have submitted and then lost its
        // database write. The view call is advisory; if it fails we rely on
        // the database claim alone.
        match client.has_pair_been_sent(contract, referrer, referee).await {
            Ok(true) => {
                error!(
                    referral_id,
                    referrer = %referrer,
                    referee = %referee,
                    stage = "guard",
                    "Payout contract already paid this pair, manual reconciliation required"
                );
                return Ok(Err(ServiceError::already_paid_on_chain(referrer, referee)));
            }
            Ok(false) => {}
            Err(e) => {
                warn!(referral_id, error = %e, stage = "guard", "hasPairBeenSent check failed, continuing");
            }
        }

        debug!(
            referral_id,
            chain = %chain.id,
            contract = %contract,
            referrer_reward = %rewards.referrer,
            referee_reward = %rewards.referee,
            stage = "send",
            "Sending referral rewards"
        );

        Ok(send_referral_rewards(
            client.as_ref(),
            contract,
            referrer,
            referee,
            &rewards.referrer,
            &rewards.referee,
        )
        .await
        .map_err(ServiceError::from))
    }
}

/// Reset txid to NULL and commit, so the referral can be retried
async fn release_claim(mut tx: Box<dyn PayoutTransaction>, referral_id: ReferralId) -> Result<()> {
    tx.set_tx_state(referral_id, &ReferralTxState::Unpaid).await?;
    tx.commit().await
}

fn resolve_addresses(
    referral: &Referral,
    wallets: &[UserWallet],
) -> std::result::Result<(Address, Address), SkipReason> {
    let address_of = |user_id: UserId| {
        wallets
            .iter()
            .find(|wallet| wallet.user_id == user_id)
            .map(|wallet| wallet.address.trim())
    };

    let (Some(referrer), Some(referee)) = (
        address_of(referral.referrer_id),
        address_of(referral.referred_id),
    ) else {
        return Err(SkipReason::MissingWallet);
    };

    let referrer = referrer.parse::<Address>().map_err(|_| SkipReason::InvalidWallet)?;
    let referee = referee.parse::<Address>().map_err(|_| SkipReason::InvalidWallet)?;

    Ok((referrer, referee))
}
