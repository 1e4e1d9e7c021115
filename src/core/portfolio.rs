//! Resolving addresses into priced balances and fanning out across chains.

use crate::core::balance::{ChainBalance, Portfolio, Token};
use crate::core::chain::{Chain, TokenListProvider};
use crate::core::normalizer::has_positive_balance;
use crate::core::price::{PriceOracle, PriceRequest};
use futures::FutureExt;
use futures::future::join_all;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressQuery {
    pub chain: Chain,
    pub address: String,
}

impl AddressQuery {
    pub fn new(chain: Chain, address: impl Into<String>) -> Self {
        AddressQuery {
            chain,
            address: address.into(),
        }
    }
}

/// Input errors detected before any request is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortfolioError {
    #[error("At least one address is required")]
    EmptyAddressList,
    #[error("Unsupported chain type: {0}")]
    UnsupportedChain(Chain),
}

/// Turns one address on one chain into a [`ChainBalance`].
pub struct ChainPortfolioResolver {
    clients: HashMap<Chain, Arc<dyn TokenListProvider>>,
    oracle: Arc<PriceOracle>,
    fetch_timeout: Duration,
}

impl ChainPortfolioResolver {
    pub fn new(oracle: Arc<PriceOracle>) -> Self {
        ChainPortfolioResolver {
            clients: HashMap::new(),
            oracle,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Registers the client for the chain it reports.
    pub fn with_client(mut self, client: Arc<dyn TokenListProvider>) -> Self {
        self.clients.insert(client.chain(), client);
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn supports(&self, chain: Chain) -> bool {
        self.clients.contains_key(&chain)
    }

    /// Never fails: fetch errors and timeouts end up in `ChainBalance::error`.
    #[instrument(name = "ResolveChain", skip(self))]
    pub async fn resolve(&self, address: &str, chain: Chain) -> ChainBalance {
        let Some(client) = self.clients.get(&chain) else {
            let error = PortfolioError::UnsupportedChain(chain);
            return ChainBalance::failed(chain, address, error.to_string());
        };

        let list = match tokio::time::timeout(self.fetch_timeout, client.token_list(address)).await {
            Ok(Ok(list)) => list,
            Ok(Err(e)) => {
                warn!("Token fetch failed for {} on {}: {:#}", address, chain, e);
                return ChainBalance::failed(chain, address, format!("{e:#}"));
            }
            Err(_) => {
                warn!(
                    "Token fetch for {} on {} timed out after {:?}",
                    address, chain, self.fetch_timeout
                );
                return ChainBalance::failed(
                    chain,
                    address,
                    format!("Request timed out after {}s", self.fetch_timeout.as_secs()),
                );
            }
        };

        if list.tokens.is_empty() {
            debug!("No tokens held by {}", address);
            return ChainBalance::empty(chain, address).with_risk_level(list.risk_level);
        }

        // Only tokens with a balance are worth a price lookup
        let priced: Vec<usize> = list
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| has_positive_balance(token.raw_balance.as_deref()))
            .map(|(index, _)| index)
            .collect();
        let requests: Vec<PriceRequest> = priced
            .iter()
            .map(|&index| PriceRequest::new(chain, list.tokens[index].address.clone()))
            .collect();
        let prices = self.oracle.get_prices(&requests).await;

        let mut unit_prices = vec![0.0; list.tokens.len()];
        for (&index, price) in priced.iter().zip(prices) {
            unit_prices[index] = price;
        }

        let all_tokens: Vec<Token> = list
            .tokens
            .into_iter()
            .zip(unit_prices)
            .map(|(raw, price)| Token::from_raw(chain, raw, price))
            .collect();

        let balance = ChainBalance::from_tokens(chain, address, all_tokens, list.risk_level);
        debug!(
            "Resolved {} of {} tokens worth {}",
            balance.tokens.len(),
            balance.all_tokens.len(),
            balance.total_value_formatted
        );
        balance
    }
}

/// Concurrent fan-out over a list of addresses.
pub struct PortfolioAggregator {
    resolver: Arc<ChainPortfolioResolver>,
}

impl PortfolioAggregator {
    pub fn new(resolver: Arc<ChainPortfolioResolver>) -> Self {
        PortfolioAggregator { resolver }
    }

    pub fn resolver(&self) -> &ChainPortfolioResolver {
        &self.resolver
    }

    /// Resolves every address concurrently. Input is validated before any
    /// request goes out; after that one failing task never affects the rest.
    pub async fn aggregate(&self, queries: &[AddressQuery]) -> Result<Portfolio, PortfolioError> {
        if queries.is_empty() {
            return Err(PortfolioError::EmptyAddressList);
        }
        if let Some(query) = queries.iter().find(|q| !self.resolver.supports(q.chain)) {
            return Err(PortfolioError::UnsupportedChain(query.chain));
        }

        info!("Aggregating balances for {} addresses", queries.len());
        let tasks = queries.iter().map(|query| {
            let resolver = Arc::clone(&self.resolver);
            async move {
                match AssertUnwindSafe(resolver.resolve(&query.address, query.chain))
                    .catch_unwind()
                    .await
                {
                    Ok(balance) => balance,
                    Err(_) => {
                        warn!("Resolution task for {} on {} panicked", query.address, query.chain);
                        ChainBalance::failed(query.chain, &query.address, "Resolution task panicked")
                    }
                }
            }
        });

        let balances = join_all(tasks).await;
        let portfolio = Portfolio::from_balances(balances);
        info!(
            "Resolved {}/{} addresses, total {}",
            portfolio.resolved_count(),
            portfolio.balances.len(),
            portfolio.total_value_formatted
        );
        Ok(portfolio)
    }

    /// One address per chain, so at most one task per chain.
    pub async fn aggregate_by_chain(
        &self,
        addresses: &HashMap<Chain, String>,
    ) -> Result<Portfolio, PortfolioError> {
        let queries: Vec<AddressQuery> = Chain::ALL
            .into_iter()
            .filter_map(|chain| {
                addresses
                    .get(&chain)
                    .map(|address| AddressQuery::new(chain, address.clone()))
            })
            .collect();
        self.aggregate(&queries).await
    }
}
