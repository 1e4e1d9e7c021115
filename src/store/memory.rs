use crate::core::alert::{Alert, AlertRepository, AlertRule, AlertRuleRepository};
use crate::core::snapshot::{BalanceSnapshot, SnapshotRepository};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// In-process repositories for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    snapshots: RwLock<Vec<BalanceSnapshot>>,
    alerts: RwLock<Vec<Alert>>,
    rules: RwLock<Vec<AlertRule>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        MemoryStore {
            rules: RwLock::new(rules),
            ..Self::default()
        }
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotRepository for MemoryStore {
    async fn append(&self, snapshot: &BalanceSnapshot) -> Result<Uuid> {
        debug!("Storing snapshot {} for {}", snapshot.id, snapshot.address_id);
        self.snapshots.write().await.push(snapshot.clone());
        Ok(snapshot.id)
    }

    async fn latest(&self, case_id: &str, address_id: &str) -> Result<Option<BalanceSnapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .iter()
            .filter(|s| s.case_id == case_id && s.address_id == address_id)
            .max_by_key(|s| s.snapshot_at)
            .cloned())
    }

    async fn in_range(
        &self,
        case_id: &str,
        address_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let snapshots = self.snapshots.read().await;
        let mut matching: Vec<BalanceSnapshot> = snapshots
            .iter()
            .filter(|s| s.case_id == case_id && s.address_id == address_id)
            .filter(|s| s.snapshot_at >= from && s.snapshot_at <= to)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.snapshot_at.cmp(&a.snapshot_at));
        Ok(matching)
    }
}

#[async_trait]
impl AlertRepository for MemoryStore {
    async fn append(&self, alert: &Alert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn mark_read(&self, case_id: &str, alert_id: Uuid) -> Result<bool> {
        let mut alerts = self.alerts.write().await;
        match alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.case_id == case_id)
        {
            Some(alert) => {
                alert.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, case_id: &str) -> Result<usize> {
        let mut alerts = self.alerts.write().await;
        let mut changed = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.case_id == case_id && !a.is_read)
        {
            alert.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_recent(&self, case_id: &str, limit: usize) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read().await;
        let mut matching: Vec<Alert> = alerts
            .iter()
            .rev()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[async_trait]
impl AlertRuleRepository for MemoryStore {
    async fn list_enabled(&self, case_id: &str) -> Result<Vec<AlertRule>> {
        let rules = self.rules.read().await;
        Ok(rules
            .iter()
            .filter(|r| r.case_id == case_id && r.enabled)
            .cloned()
            .collect())
    }
}
