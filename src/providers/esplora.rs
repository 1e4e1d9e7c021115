use crate::core::chain::{Chain, RawToken, TokenList, TokenListProvider};
use crate::providers::util::{http_client, with_retry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Bitcoin balances from an Esplora compatible indexer (mempool.space, blockstream).
pub struct EsploraProvider {
    base_url: String,
    client: reqwest::Client,
}

impl EsploraProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(EsploraProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EsploraAddress {
    chain_stats: TxoStats,
}

#[derive(Debug, Deserialize)]
struct TxoStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[async_trait]
impl TokenListProvider for EsploraProvider {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    #[instrument(name = "EsploraTokenList", skip(self), fields(address = %address))]
    async fn token_list(&self, address: &str) -> Result<TokenList> {
        let url = format!("{}/address/{}", self.base_url, address);
        debug!("Requesting address stats from {}", url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 2, 500)
            .await
            .with_context(|| format!("Failed to send request for address: {address}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for address: {}",
                response.status(),
                address
            ));
        }

        let stats: EsploraAddress = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Esplora response for address: {address}"))?;

        // Confirmed balance only; mempool activity is not final yet
        let satoshis = stats
            .chain_stats
            .funded_txo_sum
            .saturating_sub(stats.chain_stats.spent_txo_sum);

        Ok(TokenList {
            tokens: vec![RawToken::native(Chain::Bitcoin, satoshis.to_string())],
            risk_level: None,
        })
    }
}
