//! Reward amount settings
//!
//! Reads the referrer/referee reward settings through the configuration
//! cache, falling back to the settings store on a miss.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config_cache::ConfigCache;
use crate::domain::{RewardAmount, RewardAmounts};
use crate::errors::Result;
use crate::repository::SettingsRepository;
use shared::{REFEREE_REWARD_SETTING, REFERRER_REWARD_SETTING};

pub struct RewardSettings {
    cache: Arc<ConfigCache<String>>,
    repository: Arc<dyn SettingsRepository>,
}

impl RewardSettings {
    pub fn new(cache: Arc<ConfigCache<String>>, repository: Arc<dyn SettingsRepository>) -> Self {
        Self { cache, repository }
    }

    /// Raw (referrer, referee) setting values.
    ///
    /// A miss on one key is filled with a point lookup, a miss on both with a
    /// single batch lookup. Values found in the store are cached; missing keys
    /// are not.
    pub async fn raw_amounts(&self) -> Result<(Option<String>, Option<String>)> {
        let referrer = self.cache.get(REFERRER_REWARD_SETTING).await;
        let referee = self.cache.get(REFEREE_REWARD_SETTING).await;

        match (referrer, referee) {
            (Some(referrer), Some(referee)) => {
                metrics::counter!("reward_settings_cache_total", "result" => "hit").increment(1);
                Ok((Some(referrer), Some(referee)))
            }
            (Some(referrer), None) => {
                metrics::counter!("reward_settings_cache_total", "result" => "miss").increment(1);
                let referee = self.load_one(REFEREE_REWARD_SETTING).await?;
                Ok((Some(referrer), referee))
            }
            (None, Some(referee)) => {
                metrics::counter!("reward_settings_cache_total", "result" => "miss").increment(1);
                let referrer = self.load_one(REFERRER_REWARD_SETTING).await?;
                Ok((referrer, Some(referee)))
            }
            (None, None) => {
                metrics::counter!("reward_settings_cache_total", "result" => "miss").increment(1);
                debug!("Reward settings cache miss, loading from store");

                let mut stored = self
                    .repository
                    .get_settings(&[REFERRER_REWARD_SETTING, REFEREE_REWARD_SETTING])
                    .await?;

                for (key, value) in &stored {
                    self.cache.set(key.clone(), value.clone()).await;
                }

                Ok((
                    stored.remove(REFERRER_REWARD_SETTING),
                    stored.remove(REFEREE_REWARD_SETTING),
                ))
            }
        }
    }

    async fn load_one(&self, key: &str) -> Result<Option<String>> {
        debug!(setting = key, "Reward setting cache miss, loading from store");

        let value = self.repository.get_setting(key).await?;
        if let Some(value) = &value {
            self.cache.set(key, value.clone()).await;
        }

        Ok(value)
    }

    /// Both reward amounts, or `None` unless both are present and strictly positive
    pub async fn reward_amounts(&self) -> Result<Option<RewardAmounts>> {
        let (referrer, referee) = self.raw_amounts().await?;

        let referrer = parse_setting(REFERRER_REWARD_SETTING, referrer.as_deref());
        let referee = parse_setting(REFEREE_REWARD_SETTING, referee.as_deref());

        Ok(match (referrer, referee) {
            (Some(referrer), Some(referee)) => Some(RewardAmounts { referrer, referee }),
            _ => None,
        })
    }
}

fn parse_setting(key: &str, value: Option<&str>) -> Option<RewardAmount> {
    let Some(value) = value else {
        warn!(setting = key, "Reward setting is not configured");
        return None;
    };

    match value.parse::<RewardAmount>() {
        Ok(amount) => Some(amount),
        Err(e) => {
            warn!(setting = key, value, error = %e, "Reward setting is invalid");
            None
        }
    }
}
