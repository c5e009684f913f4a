use alloy::primitives::{
    utils::{format_units, parse_units},
    U256,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{errors::ServiceError, ReferralTxState, REWARD_TOKEN_DECIMALS};
use std::fmt;
use std::str::FromStr;

pub type UserId = i32;
pub type ReferralId = i32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Referral {
    pub id: ReferralId,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub txid: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Referral {
    pub fn tx_state(&self) -> ReferralTxState {
        ReferralTxState::from_txid(self.txid.as_deref())
    }
}

/// Sweep candidate: an unpaid referral whose parties both linked a wallet
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingReferral {
    pub id: ReferralId,
    pub referred_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserWallet {
    pub user_id: UserId,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardAmountError {
    #[error("reward amount is empty")]
    Empty,

    #[error("reward amount must not be negative: {0}")]
    Negative(String),

    #[error("reward amount is not a decimal number: {0}")]
    Invalid(String),

    #[error("reward amount must be greater than zero")]
    Zero,
}

/// A strictly positive reward, as configured (human-readable token units)
/// and converted to base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardAmount {
    display: String,
    base_units: U256,
}

impl RewardAmount {
    pub fn base_units(&self) -> U256 {
        self.base_units
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl FromStr for RewardAmount {
    type Err = RewardAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RewardAmountError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(RewardAmountError::Negative(trimmed.to_string()));
        }

        let base_units = parse_units(trimmed, REWARD_TOKEN_DECIMALS)
            .map_err(|_| RewardAmountError::Invalid(trimmed.to_string()))?
            .get_absolute();

        if base_units.is_zero() {
            return Err(RewardAmountError::Zero);
        }

        Ok(Self {
            display: trimmed.to_string(),
            base_units,
        })
    }
}

impl fmt::Display for RewardAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// Format base units back into token units for logs and error messages
pub fn format_token_amount(base_units: U256) -> String {
    format_units(base_units, REWARD_TOKEN_DECIMALS).unwrap_or_else(|_| base_units.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardAmounts {
    pub referrer: RewardAmount,
    pub referee: RewardAmount,
}

impl RewardAmounts {
    /// Total value that has to leave the operator wallet
    pub fn total(&self) -> U256 {
        self.referrer
            .base_units()
            .saturating_add(self.referee.base_units())
    }
}

/// Why an invocation finished without touching the referral row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No referral with a NULL or PROCESSING txid for this referred user
    NoUnpaidReferral,
    /// Referrer or referee has not linked a wallet yet
    MissingWallet,
    /// A linked wallet address could not be parsed
    InvalidWallet,
    /// Another invocation finalized the payout first
    AlreadyPaid,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoUnpaidReferral => "no_unpaid_referral",
            SkipReason::MissingWallet => "missing_wallet",
            SkipReason::InvalidWallet => "invalid_wallet",
            SkipReason::AlreadyPaid => "already_paid",
        }
    }
}

/// Result of one `process_referral_reward_for_user` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    /// Rewards submitted and the transaction hash persisted
    Paid {
        referral_id: ReferralId,
        tx_hash: String,
    },
    /// Nothing to do; the row was not modified
    Skipped(SkipReason),
    /// The claim was taken and released again; a later run may succeed
    Released {
        referral_id: ReferralId,
        reason: ServiceError,
    },
}

impl PayoutOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PayoutOutcome::Paid { .. } => "paid",
            PayoutOutcome::Skipped(_) => "skipped",
            PayoutOutcome::Released { .. } => "released",
        }
    }
}
