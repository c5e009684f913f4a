//! Sends the referrer and referee rewards in one batched contract call

use alloy::primitives::{Address, TxHash, U256};
use tracing::{info, warn};

use crate::chain_client::PayoutChain;
use crate::domain::{format_token_amount, RewardAmount};
use shared::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Wallet client has no signing account")]
    MissingAccount,

    #[error("Insufficient balance: required {required} wei, available {available} wei")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Failed to read operator balance: {0}")]
    BalanceQuery(String),

    #[error("Reward transaction failed: {0}")]
    Submission(String),
}

impl From<SendError> for ServiceError {
    fn from(error: SendError) -> Self {
        let message = error.to_string();
        match error {
            SendError::MissingAccount => ServiceError::operator_key_missing(),
            SendError::InsufficientBalance {
                required,
                available,
            } => ServiceError::insufficient_balance(
                format_token_amount(required),
                format_token_amount(available),
            ),
            SendError::BalanceQuery(_) | SendError::Submission(_) => {
                ServiceError::submission_failed(message)
            }
        }
    }
}

/// Pay `referrer_reward` to the referrer and `referee_reward` to the referee
/// from the operator wallet in a single `send` call.
///
/// The operator balance is checked first; an under-funded payout is rejected
/// without submitting anything. On success the hash of the submitted (not yet
/// confirmed) transaction is returned.
pub async fn send_referral_rewards(
    chain: &dyn PayoutChain,
    contract: Address,
    referrer: Address,
    referee: Address,
    referrer_reward: &RewardAmount,
    referee_reward: &RewardAmount,
) -> Result<TxHash, SendError> {
    let operator = chain.operator_address().ok_or(SendError::MissingAccount)?;

    let available = chain
        .balance(operator)
        .await
        .map_err(|e| SendError::BalanceQuery(format!("{:#}", e)))?;

    let required = referrer_reward
        .base_units()
        .saturating_add(referee_reward.base_units());

    if available < required {
        warn!(
            operator = %operator,
            required = %format_token_amount(required),
            available = %format_token_amount(available),
            "Operator balance too low for referral rewards, not submitting"
        );
        metrics::counter!("referral_reward_sends_total", "result" => "insufficient_balance")
            .increment(1);
        return Err(SendError::InsufficientBalance {
            required,
            available,
        });
    }

    let result = chain
        .send_batch(
            contract,
            vec![referrer, referee],
            vec![referrer_reward.base_units(), referee_reward.base_units()],
            required,
        )
        .await;

    match result {
        Ok(tx_hash) => {
            info!(
                tx_hash = %tx_hash,
                referrer = %referrer,
                referee = %referee,
                referrer_reward = %referrer_reward,
                referee_reward = %referee_reward,
                "Referral rewards submitted"
            );
            metrics::counter!("referral_reward_sends_total", "result" => "submitted").increment(1);
            Ok(tx_hash)
        }
        Err(e) => {
            warn!(error = %e, "Referral reward submission failed");
            metrics::counter!("referral_reward_sends_total", "result" => "failed").increment(1);
            Err(SendError::Submission(format!("{:#}", e)))
        }
    }
}
