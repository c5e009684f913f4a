use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use referral_processor::{
    chain_client::AlloyConnector,
    chain_registry::StaticChainRegistry,
    config::Config,
    config_cache::ConfigCache,
    explorer_client::ExplorerClient,
    repository::{PostgresPayoutStore, PostgresReferralRepository, PostgresSettingsRepository},
    reward_settings::RewardSettings,
    sweeper::RetrySweeper,
    ReferralPayoutService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging with JSON formatting (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "referral_processor=info".into());

    if use_json {
        // JSON structured logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // Human-readable logging for development
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(
        service = "referral-processor",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting referral processor"
    );

    // Load configuration
    let config = Config::load()?;
    info!(
        pool_size = config.database.pool_size,
        tx_timeout_ms = config.payout.tx_timeout_ms,
        chain_configured = config.chain.is_some(),
        sweep_interval_seconds = config.sweeper.interval_seconds,
        "Configuration loaded"
    );

    if config.payout.operator_private_key.is_none() {
        warn!("PAYOUT_PRIVATE_KEY is not set, referral payouts will be released until it is configured");
    }

    // A payout waits at most tx_max_wait for a connection to run its transaction on
    let pool = PgPoolOptions::new()
        .max_connections(config.database.pool_size)
        .acquire_timeout(config.payout.tx_max_wait())
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations applied");
    }

    let chains = Arc::new(StaticChainRegistry::from_settings(config.chain.as_ref()));
    let rewards = RewardSettings::new(
        Arc::new(ConfigCache::new(config.payout.reward_cache_ttl())),
        Arc::new(PostgresSettingsRepository::new(pool.clone())),
    );

    let mut payouts = ReferralPayoutService::new(
        Arc::new(PostgresPayoutStore::new(pool.clone())),
        chains,
        Arc::new(AlloyConnector),
        rewards,
        config.payout.operator_private_key.clone(),
    )
    .with_tx_timeout(config.payout.tx_timeout());

    // Optional audit of each referee's first transaction after payout
    let explorer_url = config
        .chain
        .as_ref()
        .and_then(|chain| chain.explorer_api_url.as_deref());
    if let Some(url) = explorer_url {
        match ExplorerClient::new(url) {
            Ok(explorer) => {
                info!(explorer_url = url, "Explorer audit enabled");
                payouts = payouts.with_explorer(explorer);
            }
            Err(e) => warn!(error = %e, "Failed to build explorer client, audit disabled"),
        }
    }
    let payouts = Arc::new(payouts);

    // Start metrics server
    let metrics_handle = tokio::spawn(start_metrics_server(config.metrics_port));

    let sweeper_handle = if config.sweeper.enabled() {
        let sweeper = RetrySweeper::new(
            Arc::new(PostgresReferralRepository::new(pool.clone())),
            payouts.clone(),
            config.sweeper.clone(),
        );
        Some(tokio::spawn(async move { sweeper.run().await }))
    } else {
        warn!("Retry sweeper disabled, payouts only run on wallet link events");
        None
    };

    info!("Referral processor running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(handle) = sweeper_handle {
        handle.abort();
    }
    metrics_handle.abort();
    pool.close().await;

    info!("Referral processor stopped");

    Ok(())
}

async fn start_metrics_server(port: u16) -> Result<()> {
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let app = Router::new().route("/metrics", get(|| async move { handle.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Processor metrics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
