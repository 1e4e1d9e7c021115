//! Alert rules, their typed configurations and the alerts they produce.

use crate::core::chain::Chain;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRuleType {
    LargeOutflow,
    LargeInflow,
    BalanceVolatility,
    AssetEmptied,
    AddressRisk,
}

impl Display for AlertRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlertRuleType::LargeOutflow => "large_outflow",
            AlertRuleType::LargeInflow => "large_inflow",
            AlertRuleType::BalanceVolatility => "balance_volatility",
            AlertRuleType::AssetEmptied => "asset_emptied",
            AlertRuleType::AddressRisk => "address_risk",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Threshold in USD for `large_outflow` and `large_inflow`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowThreshold {
    pub threshold: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilityConfig {
    pub percentage: Decimal,
    /// Trailing window in minutes.
    pub time_window: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetEmptiedConfig {
    #[serde(default)]
    pub threshold: Decimal,
    /// Drop percentage that also counts as emptied; `null` turns it off.
    #[serde(default = "default_emptied_percentage")]
    pub percentage: Option<Decimal>,
}

fn default_emptied_percentage() -> Option<Decimal> {
    Some(Decimal::from(80))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRiskConfig {
    #[serde(default)]
    pub risk_levels: Vec<u8>,
    #[serde(default)]
    pub alert_on_new_address: bool,
}

/// A rule's config payload, parsed and checked against its type.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    LargeOutflow(FlowThreshold),
    LargeInflow(FlowThreshold),
    BalanceVolatility(VolatilityConfig),
    AssetEmptied(AssetEmptiedConfig),
    AddressRisk(AddressRiskConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    #[serde(default)]
    pub case_id: String,
    #[serde(rename = "type")]
    pub rule_type: AlertRuleType,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl AlertRule {
    pub fn condition(&self) -> Result<RuleCondition> {
        let config = self.config.clone();
        let condition = match self.rule_type {
            AlertRuleType::LargeOutflow => RuleCondition::LargeOutflow(parse(config, self)?),
            AlertRuleType::LargeInflow => RuleCondition::LargeInflow(parse(config, self)?),
            AlertRuleType::BalanceVolatility => {
                RuleCondition::BalanceVolatility(parse(config, self)?)
            }
            AlertRuleType::AssetEmptied => RuleCondition::AssetEmptied(parse(config, self)?),
            AlertRuleType::AddressRisk => RuleCondition::AddressRisk(parse(config, self)?),
        };

        validate(&condition)?;
        Ok(condition)
    }
}

fn validate(condition: &RuleCondition) -> Result<()> {
    match condition {
        RuleCondition::LargeOutflow(c) | RuleCondition::LargeInflow(c)
            if c.threshold.is_sign_negative() =>
        {
            bail!("threshold must not be negative, got {}", c.threshold)
        }
        RuleCondition::BalanceVolatility(c) if c.time_window <= 0 => {
            bail!("timeWindow must be a positive number of minutes, got {}", c.time_window)
        }
        RuleCondition::BalanceVolatility(c) if c.percentage.is_sign_negative() => {
            bail!("percentage must not be negative, got {}", c.percentage)
        }
        RuleCondition::AssetEmptied(c) if c.threshold.is_sign_negative() => {
            bail!("threshold must not be negative, got {}", c.threshold)
        }
        _ => Ok(()),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(config: serde_json::Value, rule: &AlertRule) -> Result<T> {
    serde_json::from_value(config)
        .with_context(|| format!("Invalid config for {} rule '{}'", rule.rule_type, rule.id))
}

/// Structured payload attached to an alert. Only the fields relevant to the
/// rule type are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Chain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub case_id: String,
    pub address_id: Option<String>,
    pub rule_id: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertRuleType,
    pub title: String,
    pub message: String,
    pub details: AlertDetails,
    pub severity: Severity,
    #[serde(default)]
    pub is_read: bool,
    pub triggered_at: DateTime<Utc>,
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn append(&self, alert: &Alert) -> Result<()>;

    /// Returns false when the alert does not exist for the case.
    async fn mark_read(&self, case_id: &str, alert_id: Uuid) -> Result<bool>;

    /// Returns how many alerts changed state.
    async fn mark_all_read(&self, case_id: &str) -> Result<usize>;

    /// Newest first.
    async fn list_recent(&self, case_id: &str, limit: usize) -> Result<Vec<Alert>>;
}

#[async_trait]
pub trait AlertRuleRepository: Send + Sync {
    async fn list_enabled(&self, case_id: &str) -> Result<Vec<AlertRule>>;
}
