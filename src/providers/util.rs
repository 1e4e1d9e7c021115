use crate::core::normalizer::MAX_DECIMALS;
use anyhow::{Context, Error, Result};
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const MIN_RISK_LEVEL: u8 = 1;
const MAX_RISK_LEVEL: u8 = 5;

const USER_AGENT: &str = concat!("chainwatch/", env!("CARGO_PKG_VERSION"));

/// Builds a client whose every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

fn lenient_integer(value: Option<serde_json::Value>) -> Option<u64> {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Token decimals sent either as JSON numbers or as strings. Values above
/// [`MAX_DECIMALS`] are dropped so the chain default applies.
pub fn lenient_decimals<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match lenient_integer(value) {
        Some(decimals) if decimals <= u64::from(MAX_DECIMALS) => u32::try_from(decimals).ok(),
        Some(decimals) => {
            warn!("Ignoring out of range token decimals: {}", decimals);
            None
        }
        None => None,
    })
}

/// Indexer risk classification; anything outside 1-5 counts as unknown.
pub fn lenient_risk_level<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(lenient_integer(value)
        .and_then(|level| u8::try_from(level).ok())
        .filter(|level| (MIN_RISK_LEVEL..=MAX_RISK_LEVEL).contains(level)))
}

/// Raw balances as a decimal integer string, whatever JSON type carried them.
pub fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(v), _) => Some(v.to_string()),
            (None, Some(v)) if v.is_finite() && v >= 0.0 => {
                debug!("Raw balance {} is a float, integer precision may be lost", v);
                Some(format!("{v:.0}"))
            }
            _ => None,
        },
        _ => None,
    })
}
