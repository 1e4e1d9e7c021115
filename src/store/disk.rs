use crate::core::alert::{Alert, AlertRepository};
use crate::core::snapshot::{BalanceSnapshot, SnapshotRepository};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SEP: char = '\0';

/// Fixed width so lexicographic key order matches chronological order.
fn ts_key(at: DateTime<Utc>) -> String {
    format!("{:020}", at.timestamp_micros().max(0))
}

fn snapshot_prefix(case_id: &str, address_id: &str) -> String {
    format!("{case_id}{SEP}{address_id}{SEP}")
}

fn alert_prefix(case_id: &str) -> String {
    format!("{case_id}{SEP}")
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).context("Failed to serialize record")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).context("Failed to deserialize record")
}

/// Snapshots and alerts in a fjall keyspace.
///
/// `snapshots`: `case \0 address \0 micros \0 id` to snapshot JSON.
/// `alerts`: `case \0 micros \0 id` to alert JSON.
/// `alert_index`: alert id to its key in `alerts`.
#[derive(Clone)]
pub struct DiskStore {
    keyspace: Keyspace,
    snapshots: PartitionHandle,
    alerts: PartitionHandle,
    alert_index: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;

        let snapshots = keyspace.open_partition("snapshots", PartitionCreateOptions::default())?;
        let alerts = keyspace.open_partition("alerts", PartitionCreateOptions::default())?;
        let alert_index =
            keyspace.open_partition("alert_index", PartitionCreateOptions::default())?;
        debug!("Opened store at {}", path.display());

        Ok(DiskStore {
            keyspace,
            snapshots,
            alerts,
            alert_index,
        })
    }

    fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to flush store")
    }
}

#[async_trait]
impl SnapshotRepository for DiskStore {
    async fn append(&self, snapshot: &BalanceSnapshot) -> Result<Uuid> {
        let key = format!(
            "{}{}{SEP}{}",
            snapshot_prefix(&snapshot.case_id, &snapshot.address_id),
            ts_key(snapshot.snapshot_at),
            snapshot.id
        );
        self.snapshots
            .insert(key.into_bytes(), encode(snapshot)?)
            .with_context(|| format!("Failed to store snapshot {}", snapshot.id))?;
        self.persist()?;
        debug!("Stored snapshot {} for {}", snapshot.id, snapshot.address_id);
        Ok(snapshot.id)
    }

    async fn latest(&self, case_id: &str, address_id: &str) -> Result<Option<BalanceSnapshot>> {
        match self.snapshots.prefix(snapshot_prefix(case_id, address_id)).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    async fn in_range(
        &self,
        case_id: &str,
        address_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let prefix = snapshot_prefix(case_id, address_id);
        let start = format!("{prefix}{}", ts_key(from)).into_bytes();
        // '\x01' sorts after the separator, so every id stamped `to` is included
        let end = format!("{prefix}{}\x01", ts_key(to)).into_bytes();

        self.snapshots
            .range(start..=end)
            .rev()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }
}

#[async_trait]
impl AlertRepository for DiskStore {
    async fn append(&self, alert: &Alert) -> Result<()> {
        let key = format!(
            "{}{}{SEP}{}",
            alert_prefix(&alert.case_id),
            ts_key(alert.triggered_at),
            alert.id
        );
        self.alerts
            .insert(key.as_bytes(), encode(alert)?)
            .with_context(|| format!("Failed to store alert {}", alert.id))?;
        self.alert_index
            .insert(alert.id.to_string().into_bytes(), key.into_bytes())?;
        self.persist()
    }

    async fn mark_read(&self, case_id: &str, alert_id: Uuid) -> Result<bool> {
        let Some(key) = self.alert_index.get(alert_id.to_string())? else {
            return Ok(false);
        };
        let Some(value) = self.alerts.get(&key)? else {
            return Ok(false);
        };

        let mut alert: Alert = decode(&value)?;
        if alert.case_id != case_id {
            return Ok(false);
        }
        if !alert.is_read {
            alert.is_read = true;
            self.alerts.insert(key, encode(&alert)?)?;
            self.persist()?;
        }
        Ok(true)
    }

    async fn mark_all_read(&self, case_id: &str) -> Result<usize> {
        let mut unread = Vec::new();
        for entry in self.alerts.prefix(alert_prefix(case_id)) {
            let (key, value) = entry?;
            let alert: Alert = decode(&value)?;
            if !alert.is_read {
                unread.push((key, alert));
            }
        }

        let changed = unread.len();
        for (key, mut alert) in unread {
            alert.is_read = true;
            self.alerts.insert(key, encode(&alert)?)?;
        }
        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }

    async fn list_recent(&self, case_id: &str, limit: usize) -> Result<Vec<Alert>> {
        self.alerts
            .prefix(alert_prefix(case_id))
            .rev()
            .take(limit)
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::{AlertDetails, AlertRuleType, Severity};
    use crate::core::balance::ChainBalance;
    use crate::core::chain::Chain;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
    }

    fn snapshot(address_id: &str, minute: u32, total: f64) -> BalanceSnapshot {
        let mut balance = ChainBalance::empty(Chain::Tron, "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7");
        balance.total_value = total;
        BalanceSnapshot::new("case", address_id, balance, at(minute)).unwrap()
    }

    fn alert(minute: u32) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            case_id: "case".to_string(),
            address_id: Some("addr".to_string()),
            rule_id: Some("rule".to_string()),
            alert_type: AlertRuleType::LargeOutflow,
            title: format!("alert at {minute}"),
            message: "Balance decreased".to_string(),
            details: AlertDetails::default(),
            severity: Severity::Error,
            is_read: false,
            triggered_at: at(minute),
        }
    }

    #[tokio::test]
    async fn test_snapshot_ordering_and_range() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        assert!(store.latest("case", "addr").await.unwrap().is_none());
        for (minute, total) in [(10, 100.0), (0, 50.0), (5, 75.0)] {
            SnapshotRepository::append(&store, &snapshot("addr", minute, total))
                .await
                .unwrap();
        }
        // another address sharing the prefix must not leak in
        SnapshotRepository::append(&store, &snapshot("addr2", 20, 1.0))
            .await
            .unwrap();

        let latest = store.latest("case", "addr").await.unwrap().unwrap();
        assert_eq!(latest.snapshot_at, at(10));
        assert_eq!(latest.data.total_value, 100.0);

        let range = store.in_range("case", "addr", at(0), at(5)).await.unwrap();
        let times: Vec<_> = range.iter().map(|s| s.snapshot_at).collect();
        assert_eq!(times, vec![at(5), at(0)]);
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let dir = tempdir().unwrap();
        let stored = snapshot("addr", 1, 42.0);
        {
            let store = DiskStore::open(dir.path()).unwrap();
            SnapshotRepository::append(&store, &stored).await.unwrap();
        }

        let store = DiskStore::open(dir.path()).unwrap();
        let latest = store.latest("case", "addr").await.unwrap().unwrap();
        assert_eq!(latest, stored);
    }

    #[tokio::test]
    async fn test_alert_listing_and_read_state() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        let first = alert(1);
        AlertRepository::append(&store, &first).await.unwrap();
        AlertRepository::append(&store, &alert(2)).await.unwrap();
        AlertRepository::append(&store, &alert(3)).await.unwrap();

        let recent = store.list_recent("case", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].title, "alert at 3");
        assert_eq!(recent[1].title, "alert at 2");

        assert!(store.mark_read("case", first.id).await.unwrap());
        assert!(!store.mark_read("elsewhere", first.id).await.unwrap());
        assert!(!store.mark_read("case", Uuid::new_v4()).await.unwrap());
        assert_eq!(store.mark_all_read("case").await.unwrap(), 2);

        let all = store.list_recent("case", 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|a| a.is_read));
    }
}
