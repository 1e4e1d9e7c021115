use crate::core::balance::ChainBalance;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point in time record of one monitored address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub id: Uuid,
    pub case_id: String,
    pub address_id: String,
    pub data: ChainBalance,
    pub total_value: Decimal,
    pub snapshot_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Fails when the USD total is not finite or outside the decimal range.
    pub fn new(
        case_id: &str,
        address_id: &str,
        data: ChainBalance,
        snapshot_at: DateTime<Utc>,
    ) -> Result<Self> {
        let total_value = Decimal::from_f64(data.total_value)
            .with_context(|| {
                format!(
                    "Total value {} of {} {} cannot be stored",
                    data.total_value, data.chain, data.address
                )
            })?
            .round_dp(2);
        Ok(BalanceSnapshot {
            id: Uuid::new_v4(),
            case_id: case_id.to_string(),
            address_id: address_id.to_string(),
            data,
            total_value,
            snapshot_at,
        })
    }

    pub fn risk_level(&self) -> Option<u8> {
        self.data.risk_level
    }
}

/// Append-only snapshot storage. Order is by `snapshot_at`, never by insertion.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn append(&self, snapshot: &BalanceSnapshot) -> Result<Uuid>;

    async fn latest(&self, case_id: &str, address_id: &str) -> Result<Option<BalanceSnapshot>>;

    /// Snapshots with `from <= snapshot_at <= to`, newest first.
    async fn in_range(
        &self,
        case_id: &str,
        address_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BalanceSnapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain::Chain;
    use std::str::FromStr;

    #[test]
    fn test_total_is_rounded_to_cents() {
        let mut balance = ChainBalance::empty(Chain::Ethereum, "0xabc");
        balance.total_value = 1234.5678;
        balance.risk_level = Some(3);

        let snapshot = BalanceSnapshot::new("case", "addr", balance, Utc::now()).unwrap();
        assert_eq!(snapshot.total_value, Decimal::from_str("1234.57").unwrap());
        assert_eq!(snapshot.risk_level(), Some(3));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = BalanceSnapshot::new(
            "case",
            "addr",
            ChainBalance::empty(Chain::Tron, "Tabc"),
            Utc::now(),
        )
        .unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["caseId"], "case");
        assert_eq!(json["data"]["chain"], "TRON");

        let back: BalanceSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_unrepresentable_total_is_rejected() {
        for total in [1e40, f64::INFINITY, f64::NAN] {
            let mut balance = ChainBalance::empty(Chain::Ethereum, "0xabc");
            balance.total_value = total;
            let err = BalanceSnapshot::new("case", "addr", balance, Utc::now()).unwrap_err();
            assert!(err.to_string().contains("cannot be stored"), "{err}");
        }
    }
}
