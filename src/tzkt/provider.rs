use std::time::Duration;

use anyhow::Context;
use bigdecimal::BigDecimal;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::TzktSettings;
use crate::db::models::Token;
use crate::tzkt::types::OperationStep;
use crate::utils::big_pow10;

/// Delay between retries of a failed request
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenBalanceRow {
    balance: String,
}

/// Chain-data provider backed by a TzKT-style indexer API.
///
/// Transport failures are retried indefinitely with a fixed backoff, so
/// transient upstream errors never surface to the pipeline. Non-retryable
/// conditions (decode failures on a 2xx body) do propagate.
pub struct TzktProvider {
    base_url: String,
    http: reqwest::Client,
    limit: u32,
    offset_step: u32,
}

impl TzktProvider {
    pub fn new(settings: &TzktSettings) -> anyhow::Result<Self> {
        Url::parse(&settings.url).context("Invalid TzKT URL")?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            http,
            limit: settings.limit,
            offset_step: settings.offset,
        })
    }

    /// Hashes of applied operations that called one of the recognized
    /// entrypoints on `contract` at `level`. Paginates with a fixed page
    /// size until an empty page signals exhaustion.
    pub async fn get_operation_hashes(
        &self,
        contract: &str,
        entrypoints: &[&str],
        level: u64,
    ) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/operations/transactions", self.base_url);
        let mut hashes: Vec<String> = Vec::new();
        let mut offset = 0u32;

        loop {
            let page: Vec<String> = self
                .get_json(
                    &url,
                    &[
                        ("target", contract.to_string()),
                        ("entrypoint.in", entrypoints.join(",")),
                        ("level", level.to_string()),
                        ("select", "hash".to_string()),
                        ("status", "applied".to_string()),
                        ("limit", self.limit.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;

            if page.is_empty() {
                break;
            }

            hashes.extend(page);
            offset += self.offset_step;
        }

        Ok(hashes)
    }

    /// The full operation group for a hash, as an ordered list of steps.
    pub async fn get_operation(&self, hash: &str) -> anyhow::Result<Vec<OperationStep>> {
        let url = format!("{}/operations/{}", self.base_url, hash);
        self.get_json(&url, &[]).await
    }

    /// Current balance of `account` in `token`, scaled by the token's
    /// decimals. Used for concentrated-liquidity reserve lookups, where
    /// storage does not expose simple paired reserves.
    pub async fn get_token_balance(
        &self,
        token: &Token,
        account: &str,
    ) -> anyhow::Result<BigDecimal> {
        let contract = token
            .address
            .as_deref()
            .with_context(|| format!("Token {} has no contract address", token.symbol))?;

        let url = format!("{}/tokens/balances", self.base_url);
        let rows: Vec<TokenBalanceRow> = self
            .get_json(
                &url,
                &[
                    ("token.contract", contract.to_string()),
                    ("token.tokenId", token.token_id.unwrap_or(0).to_string()),
                    ("account", account.to_string()),
                ],
            )
            .await?;

        let row = rows
            .first()
            .with_context(|| format!("No balance of {} found for {}", token.symbol, account))?;

        let raw: BigDecimal = row
            .balance
            .parse()
            .with_context(|| format!("Invalid balance for token {}", token.symbol))?;

        Ok(raw / big_pow10(token.decimals))
    }

    /// GET with indefinite fixed-backoff retries on transport failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        loop {
            let response = match self.http.get(url).query(query).send().await {
                Ok(res) => res,
                Err(e) => {
                    warn!("Request to {} failed: {}. Retrying in {:?}", url, e, RETRY_DELAY);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                },
            };

            let response = match response.error_for_status() {
                Ok(res) => res,
                Err(e) => {
                    warn!("Request to {} failed: {}. Retrying in {:?}", url, e, RETRY_DELAY);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                },
            };

            return response
                .json::<T>()
                .await
                .with_context(|| format!("Failed to decode response from {}", url));
        }
    }
}
