//! USD pricing: the price source abstraction and the tiered oracle.
//!
//! The oracle walks an ordered list of [`PriceSource`]s and takes the first
//! answer that lines up with the request list. When every source fails the
//! static default table answers, so callers always get one price per request.

use crate::core::chain::Chain;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceRequest {
    pub chain: Chain,
    pub token_address: String,
}

impl PriceRequest {
    pub fn new(chain: Chain, token_address: impl Into<String>) -> Self {
        PriceRequest {
            chain,
            token_address: token_address.into(),
        }
    }

    pub fn native(chain: Chain) -> Self {
        Self::new(chain, chain.native_address())
    }

    /// Symbol the request maps to in the fallback tiers, if it is a known asset.
    pub fn symbol(&self) -> Option<&'static str> {
        symbol_for(self.chain, &self.token_address)
    }
}

/// A provider of USD unit prices. Implementations must return exactly one
/// price per request, in request order.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn prices(&self, requests: &[PriceRequest]) -> Result<Vec<f64>>;
}

pub const STABLECOINS: [&str; 5] = ["USDT", "USDC", "DAI", "TUSD", "USDD"];

const KNOWN_CONTRACTS: [(Chain, &str, &str); 11] = [
    (Chain::Ethereum, "0xdac17f958d2ee523a2206206994597c13d831ec7", "USDT"),
    (Chain::Ethereum, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC"),
    (Chain::Ethereum, "0x6b175474e89094c44da98b954eedeac495271d0f", "DAI"),
    (Chain::Ethereum, "0x0000000000085d4780b73119b644ae5ecd22b376", "TUSD"),
    (Chain::Ethereum, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "ETH"),
    (Chain::Ethereum, "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", "BTC"),
    (Chain::Tron, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", "USDT"),
    (Chain::Tron, "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8", "USDC"),
    (Chain::Tron, "TPYmHEhy5n8TCEfYGqW2rPxsghSfzghPDn", "USDD"),
    (Chain::Tron, "TNUC9Qb1rRpS5CbWLmNMxXBjyFoydXjWFR", "TRX"),
    (Chain::Tron, "TUpMhErZL2fhh4sVNULAbNKLokS4GjC1F4", "TUSD"),
];

const DEFAULT_PRICES: [(&str, f64); 8] = [
    ("BTC", 95_000.0),
    ("ETH", 3_500.0),
    ("TRX", 0.25),
    ("USDT", 1.0),
    ("USDC", 1.0),
    ("DAI", 1.0),
    ("TUSD", 1.0),
    ("USDD", 1.0),
];

/// Maps native sentinels and well known contracts to a ticker symbol.
pub fn symbol_for(chain: Chain, token_address: &str) -> Option<&'static str> {
    if chain.is_native_address(token_address) {
        return Some(chain.native_symbol());
    }
    KNOWN_CONTRACTS
        .iter()
        .find(|(c, address, _)| *c == chain && address.eq_ignore_ascii_case(token_address.trim()))
        .map(|(_, _, symbol)| *symbol)
}

pub fn default_price(symbol: &str) -> Option<f64> {
    DEFAULT_PRICES
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, price)| *price)
}

pub fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(symbol))
}

/// Last resort tier backed by [`DEFAULT_PRICES`]. Never fails.
pub struct StaticPriceTable;

impl StaticPriceTable {
    pub fn lookup(requests: &[PriceRequest]) -> Vec<f64> {
        requests
            .iter()
            .map(|request| request.symbol().and_then(default_price).unwrap_or(0.0))
            .collect()
    }
}

#[async_trait]
impl PriceSource for StaticPriceTable {
    fn name(&self) -> &str {
        "static"
    }

    async fn prices(&self, requests: &[PriceRequest]) -> Result<Vec<f64>> {
        Ok(Self::lookup(requests))
    }
}

pub struct PriceOracle {
    sources: Vec<Arc<dyn PriceSource>>,
}

impl PriceOracle {
    /// Sources are tried in order; the static table is always consulted last.
    pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        PriceOracle { sources }
    }

    #[instrument(name = "PriceLookup", skip_all, fields(count = requests.len()))]
    pub async fn get_prices(&self, requests: &[PriceRequest]) -> Vec<f64> {
        if requests.is_empty() {
            return Vec::new();
        }

        for source in &self.sources {
            match source.prices(requests).await {
                Ok(prices) if prices.len() == requests.len() => {
                    debug!("Prices resolved by {} source", source.name());
                    return prices.into_iter().map(sanitize).collect();
                }
                Ok(prices) => warn!(
                    "{} source returned {} prices for {} requests, trying next source",
                    source.name(),
                    prices.len(),
                    requests.len()
                ),
                Err(e) => warn!("{} price source failed: {:#}", source.name(), e),
            }
        }

        debug!("All price sources failed, using static defaults");
        StaticPriceTable::lookup(requests)
    }
}

fn sanitize(price: f64) -> f64 {
    if price.is_finite() && price > 0.0 {
        price
    } else {
        0.0
    }
}
