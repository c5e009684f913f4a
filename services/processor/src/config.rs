use alloy::primitives::Address;
use anyhow::Context;
use shared::{CONFIG_CACHE_TTL_MS, PAYOUT_TX_MAX_WAIT_MS, PAYOUT_TX_TIMEOUT_MS, REWARD_CHAIN_ID};
use std::env;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub payout: PayoutConfig,
    /// `None` when the affiliates chain is not configured for this deployment
    pub chain: Option<ChainSettings>,
    pub sweeper: SweeperConfig,
    pub metrics_port: u16,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Clone)]
pub struct PayoutConfig {
    pub operator_private_key: Option<String>,
    pub tx_timeout_ms: u64,
    pub tx_max_wait_ms: u64,
    pub reward_cache_ttl_ms: u64,
}

impl PayoutConfig {
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn tx_max_wait(&self) -> Duration {
        Duration::from_millis(self.tx_max_wait_ms)
    }

    pub fn reward_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.reward_cache_ttl_ms)
    }
}

// Never print the operator key
impl fmt::Debug for PayoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayoutConfig")
            .field(
                "operator_private_key",
                &self.operator_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("tx_timeout_ms", &self.tx_timeout_ms)
            .field("tx_max_wait_ms", &self.tx_max_wait_ms)
            .field("reward_cache_ttl_ms", &self.reward_cache_ttl_ms)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub payout_contract: Option<Address>,
    pub explorer_api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
    pub batch_size: i64,
}

impl SweeperConfig {
    pub fn enabled(&self) -> bool {
        self.interval_seconds > 0
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let var_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let chain = match var("AFFILIATES_CHAIN_ID") {
            Some(chain_id) => {
                let rpc_urls: Vec<String> = var("AFFILIATES_RPC_URLS")
                    .context("AFFILIATES_RPC_URLS must be set when AFFILIATES_CHAIN_ID is set")?
                    .split(',')
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty())
                    .collect();

                let payout_contract = var("AFFILIATES_PAYOUT_CONTRACT")
                    .map(|address| address.trim().parse::<Address>())
                    .transpose()
                    .context("AFFILIATES_PAYOUT_CONTRACT is not a valid address")?;

                Some(ChainSettings {
                    id: REWARD_CHAIN_ID.to_string(),
                    name: var_or("AFFILIATES_CHAIN_NAME", REWARD_CHAIN_ID),
                    chain_id: chain_id
                        .trim()
                        .parse()
                        .context("AFFILIATES_CHAIN_ID must be an integer")?,
                    rpc_urls,
                    payout_contract,
                    explorer_api_url: var("AFFILIATES_EXPLORER_URL"),
                })
            }
            None => None,
        };

        Ok(Config {
            database: DatabaseConfig {
                url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
                pool_size: var_or("DATABASE_POOL_SIZE", "10")
                    .parse()
                    .context("DATABASE_POOL_SIZE must be an integer")?,
            },
            payout: PayoutConfig {
                operator_private_key: var("PAYOUT_PRIVATE_KEY"),
                tx_timeout_ms: var_or("PAYOUT_TX_TIMEOUT_MS", &PAYOUT_TX_TIMEOUT_MS.to_string())
                    .parse()
                    .context("PAYOUT_TX_TIMEOUT_MS must be an integer")?,
                tx_max_wait_ms: var_or("PAYOUT_TX_MAX_WAIT_MS", &PAYOUT_TX_MAX_WAIT_MS.to_string())
                    .parse()
                    .context("PAYOUT_TX_MAX_WAIT_MS must be an integer")?,
                reward_cache_ttl_ms: var_or("REWARD_CACHE_TTL_MS", &CONFIG_CACHE_TTL_MS.to_string())
                    .parse()
                    .context("REWARD_CACHE_TTL_MS must be an integer")?,
            },
            chain,
            sweeper: SweeperConfig {
                interval_seconds: var_or("SWEEP_INTERVAL_SECONDS", "300")
                    .parse()
                    .context("SWEEP_INTERVAL_SECONDS must be an integer")?,
                batch_size: var_or("SWEEP_BATCH_SIZE", "50")
                    .parse()
                    .context("SWEEP_BATCH_SIZE must be an integer")?,
            },
            metrics_port: var_or("PROCESSOR_METRICS_PORT", "9092")
                .parse()
                .context("PROCESSOR_METRICS_PORT must be a port number")?,
            run_migrations: var_or("RUN_MIGRATIONS", "false")
                .eq_ignore_ascii_case("true"),
        })
    }
}
