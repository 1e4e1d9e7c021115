use crate::core::price::{PriceRequest, PriceSource, is_stablecoin};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{http_client, with_retry};

const QUOTE_ASSET: &str = "USDT";

/// Public spot ticker API, queried by symbol against the USDT quote.
pub struct SpotPriceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl SpotPriceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(SpotPriceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    async fn fetch_tickers(&self, pairs: &[String]) -> Result<HashMap<String, f64>> {
        // symbols=["BTCUSDT","ETHUSDT"], percent-encoded by hand
        let encoded = pairs
            .iter()
            .map(|pair| format!("%22{pair}%22"))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/api/v3/ticker/price?symbols=%5B{}%5D",
            self.base_url, encoded
        );
        debug!("Requesting spot tickers from {}", url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 1, 250)
            .await
            .context("Failed to send spot price request")?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} from spot price API", response.status()));
        }

        let tickers: Vec<Ticker> = response
            .json()
            .await
            .context("Failed to parse spot price response")?;

        Ok(tickers
            .into_iter()
            .filter_map(|ticker| Some((ticker.symbol, ticker.price.trim().parse().ok()?)))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct Ticker {
    symbol: String,
    price: String,
}

fn pair_for(symbol: &str) -> String {
    format!("{symbol}{QUOTE_ASSET}")
}

#[async_trait]
impl PriceSource for SpotPriceProvider {
    fn name(&self) -> &str {
        "spot"
    }

    #[instrument(name = "SpotPrices", skip_all, fields(count = requests.len()))]
    async fn prices(&self, requests: &[PriceRequest]) -> Result<Vec<f64>> {
        let symbols: Vec<Option<&'static str>> =
            requests.iter().map(PriceRequest::symbol).collect();

        let mut pairs: Vec<String> = Vec::new();
        for symbol in symbols.iter().flatten() {
            let pair = pair_for(symbol);
            if !is_stablecoin(symbol) && !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }

        let tickers = if pairs.is_empty() {
            HashMap::new()
        } else {
            self.fetch_tickers(&pairs).await?
        };

        Ok(symbols
            .into_iter()
            .map(|symbol| match symbol {
                Some(symbol) if is_stablecoin(symbol) => 1.0,
                Some(symbol) => tickers.get(&pair_for(symbol)).copied().unwrap_or(0.0),
                None => 0.0,
            })
            .collect())
    }
}
