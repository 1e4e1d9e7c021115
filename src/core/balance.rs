//! Priced token holdings per chain and the aggregated portfolio view

use crate::core::chain::{Chain, RawToken, TokenStandard};
use crate::core::normalizer::{self, format_usd};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub address: String,
    pub raw_balance: String,
    pub decimals: u32,
    pub price: f64,
    pub usd_value: f64,
    pub balance_formatted: String,
    pub usd_value_formatted: String,
    pub standard: TokenStandard,
}

impl Token {
    pub fn from_raw(chain: Chain, raw: RawToken, price: f64) -> Self {
        let decimals = match raw.decimals {
            Some(decimals) if decimals <= normalizer::MAX_DECIMALS => decimals,
            Some(decimals) => {
                warn!("Token {} reports {} decimals, using chain default", raw.symbol, decimals);
                chain.default_decimals()
            }
            None => chain.default_decimals(),
        };
        let normalized = normalizer::normalize(raw.raw_balance.as_deref(), decimals, price);

        Token {
            symbol: raw.symbol,
            name: raw.name,
            address: raw.address,
            raw_balance: raw.raw_balance.unwrap_or_else(|| "0".to_string()),
            decimals,
            price,
            usd_value: normalized.usd_value,
            balance_formatted: normalized.formatted_balance,
            usd_value_formatted: normalized.usd_value_formatted,
            standard: raw.standard,
        }
    }

    pub fn has_balance(&self) -> bool {
        normalizer::has_positive_balance(Some(&self.raw_balance))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalance {
    pub chain: Chain,
    pub address: String,
    /// Tokens with a positive balance, highest USD value first.
    pub tokens: Vec<Token>,
    /// Every token the indexer returned, including zero balances.
    pub all_tokens: Vec<Token>,
    pub total_value: f64,
    pub total_value_formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<u8>,
}

impl ChainBalance {
    pub fn empty(chain: Chain, address: &str) -> Self {
        ChainBalance {
            chain,
            address: address.to_string(),
            tokens: Vec::new(),
            all_tokens: Vec::new(),
            total_value: 0.0,
            total_value_formatted: format_usd(0.0),
            error: None,
            risk_level: None,
        }
    }

    pub fn failed(chain: Chain, address: &str, error: impl Into<String>) -> Self {
        ChainBalance {
            error: Some(error.into()),
            ..Self::empty(chain, address)
        }
    }

    /// Keeps positive balances, orders them by USD value (stable, so ties
    /// keep fetch order) and sums the total.
    pub fn from_tokens(
        chain: Chain,
        address: &str,
        all_tokens: Vec<Token>,
        risk_level: Option<u8>,
    ) -> Self {
        let mut tokens: Vec<Token> = all_tokens
            .iter()
            .filter(|token| token.has_balance())
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.usd_value.total_cmp(&a.usd_value));

        let total_value: f64 = tokens.iter().map(|token| token.usd_value).sum();

        ChainBalance {
            chain,
            address: address.to_string(),
            tokens,
            all_tokens,
            total_value,
            total_value_formatted: format_usd(total_value),
            error: None,
            risk_level,
        }
    }

    pub fn with_risk_level(mut self, risk_level: Option<u8>) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    /// One entry per requested address, in request order.
    pub balances: Vec<ChainBalance>,
    pub total_value: f64,
    pub total_value_formatted: String,
}

impl Portfolio {
    /// Failed balances are kept for reporting but contribute nothing to the total.
    pub fn from_balances(balances: Vec<ChainBalance>) -> Self {
        let total_value: f64 = balances
            .iter()
            .filter(|balance| balance.is_ok())
            .map(|balance| balance.total_value)
            .sum();

        Portfolio {
            balances,
            total_value,
            total_value_formatted: format_usd(total_value),
        }
    }

    pub fn chain(&self, chain: Chain) -> Option<&ChainBalance> {
        self.balances.iter().find(|balance| balance.chain == chain)
    }

    /// Chain keyed view; chains that were not requested map to `None`.
    pub fn by_chain(&self) -> BTreeMap<Chain, Option<&ChainBalance>> {
        Chain::ALL
            .into_iter()
            .map(|chain| (chain, self.chain(chain)))
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.balances.iter().filter(|b| b.is_ok()).count()
    }
}
