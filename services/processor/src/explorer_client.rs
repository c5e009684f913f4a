//! HTTP client for the block explorer API
//!
//! Best-effort audit helper: locates an address's earliest transaction.
//! Never fails loudly; every problem ends up in `LookupOutcome`.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::retry_strategy::RetryStrategy;
use shared::EXPLORER_PAGE_LIMIT;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct ExplorerClient {
    http_client: Client,
    base_url: String,
    page_limit: u32,
    retry: RetryStrategy,
}

#[derive(Debug, Deserialize)]
pub struct TransactionPage {
    pub meta: PageMeta,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum BlockNumber {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionSummary {
    hash: String,
    block_number: BlockNumber,
    received_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstTransaction {
    pub hash: String,
    pub block_number: u64,
    pub received_at: String,
    /// Full explorer record
    pub item: serde_json::Value,
}

/// Result of a best-effort lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(FirstTransaction),
    NotFound,
    /// The lookup failed; the message is only for logging
    Failed(String),
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_limit: EXPLORER_PAGE_LIMIT,
            retry: RetryStrategy::default(),
        })
    }

    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// Earliest transaction of `address`.
    ///
    /// The explorer lists newest first, so the oldest transaction is the last
    /// item of the last page.
    pub async fn find_first_transaction(&self, address: &str) -> LookupOutcome {
        // Pin the listing so both requests see the same page layout
        let to_date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let first_page = match self.fetch_page(address, 1, &to_date).await {
            Ok(page) => page,
            Err(e) => {
                warn!(address, error = %e, "Explorer lookup failed");
                return LookupOutcome::Failed(format!("{:#}", e));
            }
        };

        let total_pages = first_page.meta.total_pages;
        debug!(address, total_pages, "Explorer transaction pages");

        let last_page = if total_pages <= 1 {
            first_page
        } else {
            match self.fetch_page(address, total_pages, &to_date).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(address, page = total_pages, error = %e, "Explorer lookup failed");
                    return LookupOutcome::Failed(format!("{:#}", e));
                }
            }
        };

        let Some(item) = last_page.items.last() else {
            return LookupOutcome::NotFound;
        };

        match parse_first_transaction(item) {
            Ok(first) => LookupOutcome::Found(first),
            Err(e) => {
                warn!(address, error = %e, "Unexpected explorer transaction format");
                LookupOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    async fn fetch_page(&self, address: &str, page: u32, to_date: &str) -> Result<TransactionPage> {
        if !self.retry.retries_enabled() {
            return self.fetch_page_once(address, page, to_date).await;
        }

        backoff::future::retry(self.retry.create_backoff(), move || async move {
            self.fetch_page_once(address, page, to_date)
                .await
                .map_err(|e| {
                    if self.retry.is_retryable_error(&format!("{:#}", e)) {
                        debug!(address, page, error = %e, "Explorer request failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
        })
        .await
    }

    async fn fetch_page_once(&self, address: &str, page: u32, to_date: &str) -> Result<TransactionPage> {
        let url = format!("{}/transactions", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("address", address.to_string()),
                ("limit", self.page_limit.to_string()),
                ("page", page.to_string()),
                ("toDate", to_date.to_string()),
            ])
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Explorer API error {}: {}", status, body);
        }

        response
            .json::<TransactionPage>()
            .await
            .context("Failed to parse response")
    }
}

fn parse_first_transaction(item: &serde_json::Value) -> Result<FirstTransaction> {
    let summary: TransactionSummary =
        serde_json::from_value(item.clone()).context("missing hash, blockNumber or receivedAt")?;

    let block_number = match summary.block_number {
        BlockNumber::Number(number) => number,
        BlockNumber::Text(text) => text
            .parse()
            .with_context(|| format!("invalid block number {}", text))?,
    };

    Ok(FirstTransaction {
        hash: summary.hash,
        block_number,
        received_at: summary.received_at,
        item: item.clone(),
    })
}
