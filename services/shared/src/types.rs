use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::PROCESSING_TXID;

/// Payout state of a referral, derived from its nullable `txid` column
///
/// State machine:
/// - `Unpaid` -> `Processing` (claim)
/// - `Processing` -> `Paid` (send succeeded) or `Unpaid` (claim released)
///
/// `Paid` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "tx_hash", rename_all = "snake_case")]
pub enum ReferralTxState {
    Unpaid,
    Processing,
    Paid(String),
}

impl ReferralTxState {
    /// Interpret a raw `txid` column value
    pub fn from_txid(txid: Option<&str>) -> Self {
        match txid {
            None => ReferralTxState::Unpaid,
            Some(PROCESSING_TXID) => ReferralTxState::Processing,
            Some(hash) => ReferralTxState::Paid(hash.to_string()),
        }
    }

    /// The value to store in the `txid` column for this state
    pub fn to_txid(&self) -> Option<String> {
        match self {
            ReferralTxState::Unpaid => None,
            ReferralTxState::Processing => Some(PROCESSING_TXID.to_string()),
            ReferralTxState::Paid(hash) => Some(hash.clone()),
        }
    }

    /// Whether a payout may still be attempted (or is being attempted) for this row
    pub fn is_claimable(&self) -> bool {
        !self.is_paid()
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, ReferralTxState::Paid(_))
    }
}

impl fmt::Display for ReferralTxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferralTxState::Unpaid => write!(f, "unpaid"),
            ReferralTxState::Processing => write!(f, "processing"),
            ReferralTxState::Paid(hash) => write!(f, "paid({})", hash),
        }
    }
}
