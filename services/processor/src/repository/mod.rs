pub mod referral_repository;
pub mod settings_repository;

pub use referral_repository::{
    PayoutStore, PayoutTransaction, PostgresPayoutStore, PostgresReferralRepository,
    ReferralRepository,
};
pub use settings_repository::{PostgresSettingsRepository, SettingsRepository};
