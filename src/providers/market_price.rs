use crate::core::price::{PriceRequest, PriceSource};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::http_client;

const PRICE_PATH: &str = "/api/v5/dex/market/price";

/// Batched DEX market price service. One POST prices every request.
pub struct MarketPriceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl MarketPriceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(MarketPriceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketPriceQuery<'a> {
    chain_index: &'static str,
    token_contract_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct MarketPriceResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<MarketPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketPrice {
    chain_index: String,
    token_contract_address: String,
    price: String,
}

fn price_key(chain_index: &str, token_address: &str) -> String {
    format!("{}:{}", chain_index, token_address.to_lowercase())
}

#[async_trait]
impl PriceSource for MarketPriceProvider {
    fn name(&self) -> &str {
        "market"
    }

    #[instrument(name = "MarketPrices", skip_all, fields(count = requests.len()))]
    async fn prices(&self, requests: &[PriceRequest]) -> Result<Vec<f64>> {
        let body: Vec<MarketPriceQuery> = requests
            .iter()
            .map(|request| MarketPriceQuery {
                chain_index: request.chain.chain_index(),
                token_contract_address: &request.token_address,
            })
            .collect();

        let url = format!("{}{}", self.base_url, PRICE_PATH);
        debug!("Requesting {} market prices from {}", body.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to send market price request")?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} from market price service", response.status()));
        }

        let payload: MarketPriceResponse = response
            .json()
            .await
            .context("Failed to parse market price response")?;

        if payload.code != "0" {
            return Err(anyhow!(
                "Market price service error {}: {}",
                payload.code,
                payload.msg
            ));
        }

        let by_key: HashMap<String, f64> = payload
            .data
            .into_iter()
            .filter_map(|entry| {
                let price = entry.price.trim().parse::<f64>().ok()?;
                Some((price_key(&entry.chain_index, &entry.token_contract_address), price))
            })
            .collect();

        Ok(requests
            .iter()
            .map(|request| {
                by_key
                    .get(&price_key(request.chain.chain_index(), &request.token_address))
                    .copied()
                    .unwrap_or(0.0)
            })
            .collect())
    }
}
