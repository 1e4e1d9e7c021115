use crate::core::chain::{Chain, RawToken, TokenList, TokenListProvider, TokenStandard};
use crate::providers::util::{
    http_client, lenient_amount, lenient_decimals, lenient_risk_level, with_retry,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Ethereum ETH and ERC20 holdings from the Ethplorer address info API.
pub struct EthplorerProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl EthplorerProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(EthplorerProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(rename = "ETH")]
    eth: Option<EthHolding>,
    #[serde(default)]
    tokens: Vec<TokenHolding>,
    #[serde(
        default,
        alias = "riskLevel",
        alias = "risk_level",
        deserialize_with = "lenient_risk_level"
    )]
    risk: Option<u8>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct EthHolding {
    #[serde(default, alias = "rawBalance", deserialize_with = "lenient_amount")]
    raw_balance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenHolding {
    #[serde(alias = "tokenInfo")]
    token_info: TokenInfo,
    #[serde(default, alias = "rawBalance", deserialize_with = "lenient_amount")]
    raw_balance: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    balance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    address: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimals")]
    decimals: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
    message: Option<String>,
}

impl From<TokenHolding> for RawToken {
    fn from(holding: TokenHolding) -> Self {
        let info = holding.token_info;
        let symbol = info.symbol.unwrap_or_default();
        RawToken {
            name: info.name.unwrap_or_else(|| symbol.clone()),
            symbol,
            address: info.address.to_lowercase(),
            raw_balance: holding.raw_balance.or(holding.balance),
            decimals: info.decimals,
            standard: TokenStandard::Erc20,
        }
    }
}

#[async_trait]
impl TokenListProvider for EthplorerProvider {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    #[instrument(name = "EthplorerTokenList", skip(self), fields(address = %address))]
    async fn token_list(&self, address: &str) -> Result<TokenList> {
        let url = format!(
            "{}/getAddressInfo/{}?apiKey={}",
            self.base_url, address, self.api_key
        );
        debug!("Requesting token holdings for {}", address);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 2, 500)
            .await
            .with_context(|| format!("Failed to send request for address: {address}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for address: {address}"))?;

        let info: AddressInfo = serde_json::from_str(&text).with_context(|| {
            format!("Failed to parse Ethplorer response for address: {address} (HTTP {status})")
        })?;

        if let Some(error) = info.error {
            return Err(anyhow!(
                "Ethplorer error {}: {}",
                error.code.unwrap_or_default(),
                error.message.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        if !status.is_success() {
            return Err(anyhow!("HTTP error: {} for address: {}", status, address));
        }

        let native = info
            .eth
            .and_then(|eth| eth.raw_balance)
            .unwrap_or_else(|| "0".to_string());

        let mut tokens = vec![RawToken::native(Chain::Ethereum, native)];
        tokens.extend(info.tokens.into_iter().map(RawToken::from));

        Ok(TokenList {
            tokens,
            risk_level: info.risk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDRESS: &str = "0x742d35cc6634c0532925a3b844bc454e4438f44e";

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/getAddressInfo/{ADDRESS}")))
            .and(query_param("apiKey", "freekey"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_eth_and_erc20_holdings() {
        let body = r#"{
            "address": "0x742d35cc6634c0532925a3b844bc454e4438f44e",
            "ETH": {"balance": 1.5, "rawBalance": "1500000000000000000", "price": {"rate": 2000}},
            "countTxs": 12,
            "tokens": [
                {
                    "tokenInfo": {"address": "0xDAC17F958D2EE523A2206206994597C13D831EC7", "name": "Tether USD", "decimals": "6", "symbol": "USDT"},
                    "balance": 2500000,
                    "rawBalance": "2500000"
                },
                {
                    "tokenInfo": {"address": "0x1111111111111111111111111111111111111111", "decimals": 18, "symbol": "FOO"},
                    "balance": 3.0e18
                }
            ]
        }"#;
        let server = create_mock_server(200, body).await;
        let provider =
            EthplorerProvider::new(&server.uri(), "freekey", Duration::from_secs(5)).unwrap();

        let list = provider.token_list(ADDRESS).await.unwrap();
        assert_eq!(list.tokens.len(), 3);

        let eth = &list.tokens[0];
        assert_eq!(eth.standard, TokenStandard::Native);
        assert_eq!(eth.raw_balance.as_deref(), Some("1500000000000000000"));
        assert_eq!(eth.decimals, Some(18));

        let usdt = &list.tokens[1];
        assert_eq!(usdt.symbol, "USDT");
        assert_eq!(usdt.address, "0xdac17f958d2ee523a2206206994597c13d831ec7");
        assert_eq!(usdt.decimals, Some(6));
        assert_eq!(usdt.raw_balance.as_deref(), Some("2500000"));
        assert_eq!(usdt.standard, TokenStandard::Erc20);

        let foo = &list.tokens[2];
        assert_eq!(foo.name, "FOO");
        assert_eq!(foo.raw_balance.as_deref(), Some("3000000000000000000"));
        assert!(list.risk_level.is_none());
    }

    #[tokio::test]
    async fn test_address_without_eth_entry() {
        let body = r#"{"address": "0x742d35cc6634c0532925a3b844bc454e4438f44e", "riskLevel": 4}"#;
        let server = create_mock_server(200, body).await;
        let provider =
            EthplorerProvider::new(&server.uri(), "freekey", Duration::from_secs(5)).unwrap();

        let list = provider.token_list(ADDRESS).await.unwrap();
        assert_eq!(list.tokens.len(), 1);
        assert_eq!(list.tokens[0].raw_balance.as_deref(), Some("0"));
        assert_eq!(list.risk_level, Some(4));
    }

    #[tokio::test]
    async fn test_spam_token_fields_do_not_fail_the_fetch() {
        let body = r#"{
            "address": "0x742d35cc6634c0532925a3b844bc454e4438f44e",
            "riskLevel": "high",
            "tokens": [
                {
                    "tokenInfo": {"address": "0x2222222222222222222222222222222222222222", "decimals": "4294967295", "symbol": "SPAM"},
                    "rawBalance": "1"
                }
            ]
        }"#;
        let server = create_mock_server(200, body).await;
        let provider =
            EthplorerProvider::new(&server.uri(), "freekey", Duration::from_secs(5)).unwrap();

        let list = provider.token_list(ADDRESS).await.unwrap();
        assert_eq!(list.tokens.len(), 2);
        assert_eq!(list.tokens[1].symbol, "SPAM");
        assert_eq!(list.tokens[1].decimals, None);
        assert!(list.risk_level.is_none());
    }

    #[tokio::test]
    async fn test_api_error_payload() {
        let body = r#"{"error": {"code": 104, "message": "Invalid address format"}}"#;
        let server = create_mock_server(400, body).await;
        let provider =
            EthplorerProvider::new(&server.uri(), "freekey", Duration::from_secs(5)).unwrap();

        let result = provider.token_list(ADDRESS).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Ethplorer error 104: Invalid address format"
        );
    }
}
