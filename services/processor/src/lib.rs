//! Referral reward payouts
//!
//! Pays the configured referrer/referee rewards from the operator wallet once
//! a referred user and their referrer have both linked a wallet.

pub mod chain_client;
pub mod chain_registry;
pub mod config;
pub mod config_cache;
pub mod domain;
pub mod errors;
pub mod explorer_client;
pub mod referral_payout;
pub mod repository;
pub mod retry_strategy;
pub mod reward_sender;
pub mod reward_settings;
pub mod sweeper;

pub use config::Config;
pub use domain::{PayoutOutcome, SkipReason};
pub use errors::PayoutError;
pub use referral_payout::ReferralPayoutService;
