use crate::core::cache::Cache;
use crate::core::price::{PriceRequest, PriceSource};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Price source that remembers unit prices for `ttl` and only forwards
/// cache misses to the wrapped source.
#[derive(Clone)]
pub struct CachingPriceSource {
    inner: Arc<dyn PriceSource>,
    cache: Cache<String, f64>,
    ttl: Duration,
}

impl CachingPriceSource {
    pub fn new(inner: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::new(),
            ttl,
        }
    }
}

fn cache_key(request: &PriceRequest) -> String {
    format!("{}:{}", request.chain, request.token_address.to_lowercase())
}

#[async_trait]
impl PriceSource for CachingPriceSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn prices(&self, requests: &[PriceRequest]) -> Result<Vec<f64>> {
        let mut prices = Vec::with_capacity(requests.len());
        let mut misses = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            let cached = self.cache.get(&cache_key(request)).await;
            if cached.is_none() {
                misses.push(index);
            }
            prices.push(cached);
        }

        if misses.is_empty() {
            debug!("All {} prices served from cache", requests.len());
        } else {
            let pending: Vec<PriceRequest> =
                misses.iter().map(|&index| requests[index].clone()).collect();
            let fetched = self.inner.prices(&pending).await?;
            if fetched.len() != pending.len() {
                return Err(anyhow!(
                    "{} source returned {} prices for {} requests",
                    self.inner.name(),
                    fetched.len(),
                    pending.len()
                ));
            }
            for (&index, price) in misses.iter().zip(fetched) {
                self.cache
                    .put(cache_key(&requests[index]), price, Some(self.ttl))
                    .await;
                prices[index] = Some(price);
            }
        }

        Ok(prices.into_iter().map(|price| price.unwrap_or(0.0)).collect())
    }
}
