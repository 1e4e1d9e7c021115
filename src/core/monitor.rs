//! Poll, snapshot and detect: the pipeline run for each monitored case.

use crate::core::alert::{Alert, AlertRepository};
use crate::core::balance::{ChainBalance, Portfolio};
use crate::core::chain::Chain;
use crate::core::portfolio::{AddressQuery, PortfolioAggregator};
use crate::core::rules::AlertRuleEngine;
use crate::core::snapshot::{BalanceSnapshot, SnapshotRepository};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredAddress {
    #[serde(rename = "id")]
    pub address_id: String,
    pub chain: Chain,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub snapshots_created: usize,
    pub alerts_triggered: usize,
    pub alerts: Vec<Alert>,
    pub portfolio: Portfolio,
}

pub struct Monitor {
    aggregator: Arc<PortfolioAggregator>,
    snapshots: Arc<dyn SnapshotRepository>,
    alerts: Arc<dyn AlertRepository>,
    engine: AlertRuleEngine,
}

impl Monitor {
    pub fn new(
        aggregator: Arc<PortfolioAggregator>,
        snapshots: Arc<dyn SnapshotRepository>,
        alerts: Arc<dyn AlertRepository>,
        engine: AlertRuleEngine,
    ) -> Self {
        Monitor {
            aggregator,
            snapshots,
            alerts,
            engine,
        }
    }

    /// Fetches every address, stores one snapshot per successfully resolved
    /// address and evaluates the case's rules against it. A storage failure
    /// only affects the address it happened for.
    #[instrument(name = "PollAndDetect", skip(self, addresses), fields(addresses = addresses.len()))]
    pub async fn poll_and_detect(
        &self,
        case_id: &str,
        addresses: &[MonitoredAddress],
    ) -> Result<PollOutcome> {
        let queries: Vec<AddressQuery> = addresses
            .iter()
            .map(|a| AddressQuery::new(a.chain, a.address.clone()))
            .collect();
        let portfolio = self.aggregator.aggregate(&queries).await?;
        let now = Utc::now();

        let mut snapshots_created = 0;
        let mut triggered = Vec::new();
        for (monitored, balance) in addresses.iter().zip(&portfolio.balances) {
            if let Some(error) = &balance.error {
                warn!(
                    "Skipping snapshot for {}: balance query failed: {}",
                    monitored.address_id, error
                );
                continue;
            }
            if let Some(alerts) = self.record(case_id, monitored, balance, now).await {
                snapshots_created += 1;
                triggered.extend(alerts);
            }
        }

        info!(
            "Case {}: {} snapshots, {} alerts",
            case_id,
            snapshots_created,
            triggered.len()
        );
        Ok(PollOutcome {
            snapshots_created,
            alerts_triggered: triggered.len(),
            alerts: triggered,
            portfolio,
        })
    }

    /// Returns the stored alerts, or `None` when no snapshot could be written.
    async fn record(
        &self,
        case_id: &str,
        monitored: &MonitoredAddress,
        balance: &ChainBalance,
        now: DateTime<Utc>,
    ) -> Option<Vec<Alert>> {
        let address_id = monitored.address_id.as_str();
        let previous = match self.snapshots.latest(case_id, address_id).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Failed to read latest snapshot for {}: {:#}", address_id, e);
                return None;
            }
        };

        let snapshot = match BalanceSnapshot::new(case_id, address_id, balance.clone(), now) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Skipping snapshot for {}: {:#}", address_id, e);
                return None;
            }
        };
        if let Err(e) = self.snapshots.append(&snapshot).await {
            warn!("Failed to store snapshot for {}: {:#}", address_id, e);
            return None;
        }
        debug!("Stored snapshot {} ({})", snapshot.id, snapshot.total_value);

        let alerts = match self
            .engine
            .evaluate(case_id, address_id, previous.as_ref(), &snapshot)
            .await
        {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("Rule evaluation failed for {}: {:#}", address_id, e);
                return Some(Vec::new());
            }
        };

        let mut stored = Vec::with_capacity(alerts.len());
        for alert in alerts {
            match self.alerts.append(&alert).await {
                Ok(()) => stored.push(alert),
                Err(e) => warn!("Failed to store alert '{}': {:#}", alert.title, e),
            }
        }
        Some(stored)
    }
}
