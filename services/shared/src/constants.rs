/// Shared constants for the referral reward payout system
///
/// This module centralizes the magic values shared by the payout orchestrator,
/// the retry sweeper and the database schema so they cannot drift apart.

/// Placeholder stored in `referrals.txid` while a payout is in flight.
///
/// Distinct from NULL (unpaid) and from any real transaction hash (paid).
/// Must never be a valid `0x`-prefixed hash.
pub const PROCESSING_TXID: &str = "PROCESSING";

/// Logical identifier of the chain that referral rewards are paid on.
///
/// Fixed for the whole deployment, never chosen per call.
pub const REWARD_CHAIN_ID: &str = "affiliates";

/// Site setting holding the referrer reward (decimal token units, e.g. "0.05")
pub const REFERRER_REWARD_SETTING: &str = "referral_referrer_reward";

/// Site setting holding the referee reward (decimal token units)
pub const REFEREE_REWARD_SETTING: &str = "referral_referee_reward";

/// Default time-to-live of configuration cache entries (60 seconds)
pub const CONFIG_CACHE_TTL_MS: u64 = 60_000;

/// Hard timeout of the payout database transaction (60 seconds)
///
/// Rationale: the transaction spans RPC reads and the on-chain submission,
/// so it must tolerate slow endpoints. Exceeding it rolls back every write,
/// including the PROCESSING claim.
pub const PAYOUT_TX_TIMEOUT_MS: u64 = 60_000;

/// Maximum wait for a database connection to open the payout transaction (10 seconds)
pub const PAYOUT_TX_MAX_WAIT_MS: u64 = 10_000;

/// Page size used when walking the explorer transaction list
pub const EXPLORER_PAGE_LIMIT: u32 = 50;

/// Number of decimals of the reward token (native coin, wei precision)
pub const REWARD_TOKEN_DECIMALS: u8 = 18;
