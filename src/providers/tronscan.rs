use crate::core::chain::{Chain, RawToken, TokenList, TokenListProvider, TokenStandard};
use crate::providers::util::{
    http_client, lenient_amount, lenient_decimals, lenient_risk_level, with_retry,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Tronscan lists TRX under this token id.
const TRX_TOKEN_ID: &str = "_";

/// TRX, TRC10 and TRC20 holdings from the Tronscan account tokens API.
pub struct TronscanProvider {
    base_url: String,
    client: reqwest::Client,
}

impl TronscanProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(TronscanProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccountTokens {
    #[serde(default)]
    data: Vec<TronToken>,
    #[serde(
        default,
        alias = "riskLevel",
        alias = "risk_level",
        deserialize_with = "lenient_risk_level"
    )]
    risk: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TronToken {
    #[serde(alias = "contractAddress")]
    token_id: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    balance: Option<String>,
    #[serde(default)]
    token_name: Option<String>,
    #[serde(default)]
    token_abbr: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimals")]
    token_decimal: Option<u32>,
    #[serde(default)]
    token_type: Option<String>,
}

impl From<TronToken> for RawToken {
    fn from(token: TronToken) -> Self {
        if token.token_id == TRX_TOKEN_ID {
            let mut native = RawToken::native(Chain::Tron, token.balance.unwrap_or_default());
            if native.raw_balance.as_deref() == Some("") {
                native.raw_balance = None;
            }
            return native;
        }

        let symbol = token
            .token_abbr
            .map(|abbr| abbr.to_uppercase())
            .unwrap_or_default();
        RawToken {
            name: token.token_name.unwrap_or_else(|| symbol.clone()),
            symbol,
            address: token.token_id,
            raw_balance: token.balance,
            decimals: token.token_decimal,
            standard: token
                .token_type
                .as_deref()
                .map_or(TokenStandard::Unknown, TokenStandard::parse),
        }
    }
}

#[async_trait]
impl TokenListProvider for TronscanProvider {
    fn chain(&self) -> Chain {
        Chain::Tron
    }

    #[instrument(name = "TronscanTokenList", skip(self), fields(address = %address))]
    async fn token_list(&self, address: &str) -> Result<TokenList> {
        let url = format!(
            "{}/api/account/tokens?address={}&start=0&limit=100&hidden=0&show=0",
            self.base_url, address
        );
        debug!("Requesting token holdings from {}", url);

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

        let account: AccountTokens = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Tronscan response for address: {address}"))?;

        Ok(TokenList {
            tokens: account.data.into_iter().map(RawToken::from).collect(),
            risk_level: account.risk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDRESS: &str = "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7";

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/account/tokens"))
            .and(query_param("address", ADDRESS))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_trx_and_trc20_tokens() {
        let body = r#"{
            "total": 3,
            "data": [
                {"tokenId": "_", "balance": "12500000", "tokenName": "trx", "tokenAbbr": "trx", "tokenDecimal": 6, "tokenType": "trc10"},
                {"tokenId": "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", "balance": "5000000", "tokenName": "Tether USD", "tokenAbbr": "USDT", "tokenDecimal": 6, "tokenType": "trc20"},
                {"tokenId": "1002000", "balance": "0", "tokenName": "BitTorrent Old", "tokenAbbr": "bttold", "tokenDecimal": 6, "tokenType": "trc10"}
            ],
            "riskLevel": 2
        }"#;
        let server = create_mock_server(200, body).await;
        let provider = TronscanProvider::new(&server.uri(), Duration::from_secs(5)).unwrap();

        let list = provider.token_list(ADDRESS).await.unwrap();
        assert_eq!(list.tokens.len(), 3);
        assert_eq!(list.risk_level, Some(2));

        let trx = &list.tokens[0];
        assert_eq!(trx.symbol, "TRX");
        assert_eq!(trx.standard, TokenStandard::Native);
        assert_eq!(trx.address, Chain::Tron.native_address());
        assert_eq!(trx.raw_balance.as_deref(), Some("12500000"));

        let usdt = &list.tokens[1];
        assert_eq!(usdt.symbol, "USDT");
        assert_eq!(usdt.standard, TokenStandard::Trc20);
        assert_eq!(usdt.decimals, Some(6));

        let btt = &list.tokens[2];
        assert_eq!(btt.symbol, "BTTOLD");
        assert_eq!(btt.standard, TokenStandard::Trc10);
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = create_mock_server(503, "").await;
        let provider = TronscanProvider::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let result = provider.token_list(ADDRESS).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            format!("HTTP error: 503 Service Unavailable for address: {ADDRESS}")
        );
    }
}
