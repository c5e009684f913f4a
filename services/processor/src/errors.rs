use std::time::Duration;

/// Failures that escape `process_referral_reward_for_user`.
///
/// Expected business outcomes (missing wallet, bad configuration, failed send)
/// are not errors; they are reported through `PayoutOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payout transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PayoutError>;
