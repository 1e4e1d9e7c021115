//! Supported chains, token standards and the token list abstraction

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    #[serde(alias = "BTC")]
    Bitcoin,
    #[serde(alias = "ETH")]
    Ethereum,
    #[serde(alias = "TRX")]
    Tron,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Bitcoin, Chain::Ethereum, Chain::Tron];

    pub fn default_decimals(&self) -> u32 {
        match self {
            Chain::Bitcoin => 8,
            Chain::Ethereum => 18,
            Chain::Tron => 6,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
            Chain::Tron => "TRX",
        }
    }

    pub fn native_name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "Bitcoin",
            Chain::Ethereum => "Ethereum",
            Chain::Tron => "TRON",
        }
    }

    /// Address used to denote the native coin of the chain.
    pub fn native_address(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "",
            Chain::Ethereum => "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
            Chain::Tron => "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb",
        }
    }

    /// Indexers disagree on the native sentinel, so every known spelling is accepted.
    pub fn is_native_address(&self, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() || address.eq_ignore_ascii_case(self.native_address()) {
            return true;
        }
        match self {
            Chain::Bitcoin => address.eq_ignore_ascii_case("btc"),
            Chain::Ethereum => address == "0x0000000000000000000000000000000000000000",
            Chain::Tron => address == "_",
        }
    }

    /// Chain identifier used by the market price service.
    pub fn chain_index(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "0",
            Chain::Ethereum => "1",
            Chain::Tron => "195",
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Chain::Bitcoin => "BITCOIN",
                Chain::Ethereum => "ETHEREUM",
                Chain::Tron => "TRON",
            }
        )
    }
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BITCOIN" | "BTC" => Ok(Chain::Bitcoin),
            "ETHEREUM" | "ETH" => Ok(Chain::Ethereum),
            "TRON" | "TRX" => Ok(Chain::Tron),
            _ => Err(anyhow::anyhow!("Unsupported chain type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenStandard {
    Native,
    Erc20,
    Trc20,
    Trc10,
    Omni,
    Unknown,
}

impl TokenStandard {
    /// Lenient parse of the tags indexers put on tokens (`trc20`, `ERC-20`, ...).
    pub fn parse(tag: &str) -> Self {
        let normalized: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "NATIVE" => TokenStandard::Native,
            "ERC20" => TokenStandard::Erc20,
            "TRC20" => TokenStandard::Trc20,
            "TRC10" => TokenStandard::Trc10,
            "OMNI" => TokenStandard::Omni,
            _ => TokenStandard::Unknown,
        }
    }
}

/// A token as reported by an indexer, before pricing and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub symbol: String,
    pub name: String,
    pub address: String,
    /// Integer balance in the token's smallest unit, as a decimal string.
    pub raw_balance: Option<String>,
    pub decimals: Option<u32>,
    pub standard: TokenStandard,
}

impl RawToken {
    pub fn native(chain: Chain, raw_balance: impl Into<String>) -> Self {
        RawToken {
            symbol: chain.native_symbol().to_string(),
            name: chain.native_name().to_string(),
            address: chain.native_address().to_string(),
            raw_balance: Some(raw_balance.into()),
            decimals: Some(chain.default_decimals()),
            standard: TokenStandard::Native,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenList {
    pub tokens: Vec<RawToken>,
    /// Address risk classification (1-5) when the indexer supplies one.
    pub risk_level: Option<u8>,
}

#[async_trait]
pub trait TokenListProvider: Send + Sync {
    fn chain(&self) -> Chain;

    async fn token_list(&self, address: &str) -> Result<TokenList>;
}
