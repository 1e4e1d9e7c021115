//! Rule evaluation against consecutive balance snapshots.
//!
//! [`evaluate_rules`] is a pure function of the rules, the previous and
//! current snapshot and the trailing history. [`AlertRuleEngine`] loads the
//! inputs from the repositories and delegates to it.

use crate::core::alert::{
    AddressRiskConfig, Alert, AlertDetails, AlertRule, AlertRuleRepository, AssetEmptiedConfig,
    FlowThreshold, RuleCondition, Severity, VolatilityConfig,
};
use crate::core::snapshot::{BalanceSnapshot, SnapshotRepository};
use anyhow::{Context, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Levels at and above this are reported as errors.
const HIGH_RISK_LEVEL: u8 = 4;

/// Everything one evaluation cycle looks at.
pub struct EvaluationContext<'a> {
    pub case_id: &'a str,
    pub address_id: &'a str,
    pub previous: Option<&'a BalanceSnapshot>,
    pub current: &'a BalanceSnapshot,
    /// Snapshots of the same address around the volatility windows, any order.
    pub history: &'a [BalanceSnapshot],
}

/// `change` as a percentage of `base`, two decimals. None for a zero base.
fn percent_of(change: Decimal, base: Decimal) -> Option<Decimal> {
    if base.is_zero() {
        return None;
    }
    Some((change * Decimal::ONE_HUNDRED / base).round_dp(2))
}

impl EvaluationContext<'_> {
    fn base_details(&self, rule: &AlertRule) -> AlertDetails {
        AlertDetails {
            chain: Some(self.current.data.chain),
            address: Some(self.current.data.address.clone()),
            current_value: Some(self.current.total_value),
            previous_value: self.previous.map(|p| p.total_value),
            rule_name: Some(rule.name.clone()),
            ..AlertDetails::default()
        }
    }

    fn alert(
        &self,
        rule: &AlertRule,
        severity: Severity,
        title: String,
        message: String,
        details: AlertDetails,
    ) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            case_id: self.case_id.to_string(),
            address_id: Some(self.address_id.to_string()),
            rule_id: Some(rule.id.clone()),
            alert_type: rule.rule_type,
            title,
            message,
            details,
            severity,
            is_read: false,
            triggered_at: self.current.snapshot_at,
        }
    }

    fn label(&self) -> String {
        format!("{} address {}", self.current.data.chain, self.current.data.address)
    }

    fn large_outflow(&self, rule: &AlertRule, config: &FlowThreshold) -> Option<Alert> {
        let previous = self.previous?.total_value;
        let current = self.current.total_value;
        let decrease = previous - current;
        if decrease <= Decimal::ZERO || decrease < config.threshold {
            return None;
        }

        let details = AlertDetails {
            change_amount: Some(decrease),
            change_percentage: percent_of(decrease, previous),
            threshold: Some(config.threshold),
            ..self.base_details(rule)
        };
        Some(self.alert(
            rule,
            Severity::Error,
            "Large outflow detected".to_string(),
            format!(
                "Balance of {} decreased by ${} (from ${} to ${})",
                self.label(),
                decrease,
                previous,
                current
            ),
            details,
        ))
    }

    fn large_inflow(&self, rule: &AlertRule, config: &FlowThreshold) -> Option<Alert> {
        let previous = self.previous?.total_value;
        let current = self.current.total_value;
        let increase = current - previous;
        if increase <= Decimal::ZERO || increase < config.threshold {
            return None;
        }

        let details = AlertDetails {
            change_amount: Some(increase),
            change_percentage: percent_of(increase, previous),
            threshold: Some(config.threshold),
            ..self.base_details(rule)
        };
        Some(self.alert(
            rule,
            Severity::Info,
            "Large inflow detected".to_string(),
            format!(
                "Balance of {} increased by ${} (from ${} to ${})",
                self.label(),
                increase,
                previous,
                current
            ),
            details,
        ))
    }

    fn balance_volatility(&self, rule: &AlertRule, config: &VolatilityConfig) -> Option<Alert> {
        let now = self.current.snapshot_at;
        let window_start = now - Duration::minutes(config.time_window);

        let base = self
            .history
            .iter()
            .filter(|s| s.id != self.current.id)
            .filter(|s| s.snapshot_at >= window_start && s.snapshot_at < now)
            .min_by_key(|s| s.snapshot_at)?;

        let change = self.current.total_value - base.total_value;
        let percentage = percent_of(change.abs(), base.total_value)?;
        if percentage < config.percentage {
            return None;
        }

        let details = AlertDetails {
            previous_value: Some(base.total_value),
            change_amount: Some(change),
            change_percentage: Some(percentage),
            percentage: Some(config.percentage),
            time_window_minutes: Some(config.time_window),
            ..self.base_details(rule)
        };
        Some(self.alert(
            rule,
            Severity::Warning,
            "Balance volatility detected".to_string(),
            format!(
                "Balance of {} moved {}% within {} minutes (from ${} to ${})",
                self.label(),
                percentage,
                config.time_window,
                base.total_value,
                self.current.total_value
            ),
            details,
        ))
    }

    fn asset_emptied(&self, rule: &AlertRule, config: &AssetEmptiedConfig) -> Option<Alert> {
        let previous = self.previous?.total_value;
        let current = self.current.total_value;
        let decrease = previous - current;
        let drop_percentage = if decrease > Decimal::ZERO {
            percent_of(decrease, previous)
        } else {
            None
        };

        let crossed = previous > config.threshold && current <= config.threshold;
        let dropped = match (drop_percentage, config.percentage) {
            (Some(actual), Some(limit)) => actual >= limit,
            _ => false,
        };
        if !crossed && !dropped {
            return None;
        }

        let reason = if crossed {
            format!("fell to or below ${}", config.threshold)
        } else {
            format!("dropped by {}%", drop_percentage.unwrap_or_default())
        };
        let details = AlertDetails {
            change_amount: Some(decrease),
            change_percentage: drop_percentage,
            threshold: Some(config.threshold),
            percentage: config.percentage,
            ..self.base_details(rule)
        };
        Some(self.alert(
            rule,
            Severity::Error,
            "Asset emptied".to_string(),
            format!(
                "Balance of {} {} (from ${} to ${})",
                self.label(),
                reason,
                previous,
                current
            ),
            details,
        ))
    }

    fn address_risk(&self, rule: &AlertRule, config: &AddressRiskConfig) -> Option<Alert> {
        match self.current.risk_level() {
            Some(level) if config.risk_levels.contains(&level) => {
                let severity = if level >= HIGH_RISK_LEVEL {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                let details = AlertDetails {
                    risk_level: Some(level),
                    ..self.base_details(rule)
                };
                Some(self.alert(
                    rule,
                    severity,
                    "Risky address detected".to_string(),
                    format!("{} is classified at risk level {}", self.label(), level),
                    details,
                ))
            }
            None if config.alert_on_new_address && self.previous.is_none() => Some(self.alert(
                rule,
                Severity::Warning,
                "New address without risk data".to_string(),
                format!("No risk classification is available yet for {}", self.label()),
                self.base_details(rule),
            )),
            _ => None,
        }
    }
}

/// Evaluates every enabled rule. A rule with a malformed config is logged
/// and skipped; the others still run. Each rule fires at most once.
pub fn evaluate_rules(rules: &[AlertRule], ctx: &EvaluationContext) -> Vec<Alert> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| {
            let condition = match rule.condition() {
                Ok(condition) => condition,
                Err(e) => {
                    warn!("Skipping rule '{}': {:#}", rule.id, e);
                    return None;
                }
            };
            let alert = match &condition {
                RuleCondition::LargeOutflow(c) => ctx.large_outflow(rule, c),
                RuleCondition::LargeInflow(c) => ctx.large_inflow(rule, c),
                RuleCondition::BalanceVolatility(c) => ctx.balance_volatility(rule, c),
                RuleCondition::AssetEmptied(c) => ctx.asset_emptied(rule, c),
                RuleCondition::AddressRisk(c) => ctx.address_risk(rule, c),
            };
            if let Some(alert) = &alert {
                debug!("Rule '{}' fired: {}", rule.id, alert.title);
            }
            alert
        })
        .collect()
}

pub struct AlertRuleEngine {
    rules: Arc<dyn AlertRuleRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
}

impl AlertRuleEngine {
    pub fn new(rules: Arc<dyn AlertRuleRepository>, snapshots: Arc<dyn SnapshotRepository>) -> Self {
        AlertRuleEngine { rules, snapshots }
    }

    /// Runs after `current` has been stored; `previous` is the snapshot that
    /// was latest before that write.
    #[instrument(name = "EvaluateRules", skip(self, previous, current))]
    pub async fn evaluate(
        &self,
        case_id: &str,
        address_id: &str,
        previous: Option<&BalanceSnapshot>,
        current: &BalanceSnapshot,
    ) -> Result<Vec<Alert>> {
        let rules = self
            .rules
            .list_enabled(case_id)
            .await
            .with_context(|| format!("Failed to load alert rules for case {case_id}"))?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let widest_window = rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter_map(|rule| match rule.condition() {
                Ok(RuleCondition::BalanceVolatility(c)) => Some(c.time_window),
                _ => None,
            })
            .max();

        let history = match widest_window {
            Some(minutes) => {
                let to = current.snapshot_at;
                let from = to - Duration::minutes(minutes);
                self.snapshots
                    .in_range(case_id, address_id, from, to)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Failed to load snapshot history for {}: {:#}", address_id, e);
                        Vec::new()
                    })
            }
            None => Vec::new(),
        };

        let ctx = EvaluationContext {
            case_id,
            address_id,
            previous,
            current,
            history: &history,
        };
        Ok(evaluate_rules(&rules, &ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::AlertRuleType;
    use crate::core::balance::ChainBalance;
    use crate::core::chain::Chain;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn snapshot(total: i64, minutes_ago: i64) -> BalanceSnapshot {
        let mut balance = ChainBalance::empty(Chain::Ethereum, "0xabc");
        balance.total_value = total as f64;
        BalanceSnapshot::new("case", "addr", balance, now() - Duration::minutes(minutes_ago)).unwrap()
    }

    fn rule(id: &str, rule_type: AlertRuleType, config: serde_json::Value) -> AlertRule {
        AlertRule {
            id: id.to_string(),
            case_id: "case".to_string(),
            rule_type,
            name: format!("{id} rule"),
            config,
            enabled: true,
        }
    }

    fn run(
        rules: &[AlertRule],
        previous: Option<&BalanceSnapshot>,
        current: &BalanceSnapshot,
        history: &[BalanceSnapshot],
    ) -> Vec<Alert> {
        let ctx = EvaluationContext {
            case_id: "case",
            address_id: "addr",
            previous,
            current,
            history,
        };
        evaluate_rules(rules, &ctx)
    }

    #[test]
    fn test_asset_emptied_by_percentage_drop() {
        let previous = snapshot(10_000, 5);
        let current = snapshot(1_400, 0);
        let rules = [rule("empty", AlertRuleType::AssetEmptied, json!({"threshold": 1}))];

        let alerts = run(&rules, Some(&previous), &current, &[]);
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.severity, Severity::Error);
        assert_eq!(alert.alert_type, AlertRuleType::AssetEmptied);
        assert_eq!(alert.details.change_amount, Some(Decimal::from(8_600)));
        assert_eq!(alert.details.change_percentage, Some(Decimal::from(86)));
        assert_eq!(alert.details.previous_value, Some(Decimal::from(10_000)));
        assert_eq!(alert.details.current_value, Some(Decimal::from(1_400)));
        assert_eq!(alert.rule_id.as_deref(), Some("empty"));
        assert_eq!(alert.triggered_at, current.snapshot_at);
        assert!(!alert.is_read);
    }

    #[test]
    fn test_asset_emptied_threshold_crossing() {
        let previous = snapshot(50, 5);
        let current = snapshot(0, 0);
        let rules = [rule(
            "empty",
            AlertRuleType::AssetEmptied,
            json!({"threshold": 1, "percentage": null}),
        )];

        let alerts = run(&rules, Some(&previous), &current, &[]);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("fell to or below $1"));

        // Already below the threshold: nothing new to report
        let alerts = run(&rules, Some(&current), &snapshot(0, -5), &[]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_small_outflow_is_ignored() {
        let previous = snapshot(5_000, 5);
        let current = snapshot(4_500, 0);
        let rules = [rule("out", AlertRuleType::LargeOutflow, json!({"threshold": 1000}))];
        assert!(run(&rules, Some(&previous), &current, &[]).is_empty());
    }

    #[test]
    fn test_flows_need_a_previous_snapshot() {
        let current = snapshot(5_000, 0);
        let rules = [
            rule("out", AlertRuleType::LargeOutflow, json!({"threshold": 0})),
            rule("in", AlertRuleType::LargeInflow, json!({"threshold": 0})),
            rule("empty", AlertRuleType::AssetEmptied, json!({})),
        ];
        assert!(run(&rules, None, &current, &[]).is_empty());
    }

    #[test]
    fn test_large_flows() {
        let rules = [
            rule("out", AlertRuleType::LargeOutflow, json!({"threshold": 1000})),
            rule("in", AlertRuleType::LargeInflow, json!({"threshold": 1000})),
        ];

        let alerts = run(&rules, Some(&snapshot(5_000, 5)), &snapshot(4_000, 0), &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertRuleType::LargeOutflow);
        assert_eq!(alerts[0].severity, Severity::Error);
        assert_eq!(alerts[0].details.change_amount, Some(Decimal::from(1_000)));
        assert_eq!(alerts[0].details.change_percentage, Some(Decimal::from(20)));

        let alerts = run(&rules, Some(&snapshot(0, 5)), &snapshot(2_500, 0), &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertRuleType::LargeInflow);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].details.change_percentage, None);

        // Unchanged balance never fires, even with a zero threshold
        let zero = [rule("out", AlertRuleType::LargeOutflow, json!({"threshold": 0}))];
        assert!(run(&zero, Some(&snapshot(100, 5)), &snapshot(100, 0), &[]).is_empty());
    }

    #[test]
    fn test_volatility_ignores_snapshots_outside_window() {
        let old = snapshot(10_000, 20);
        let current = snapshot(5_000, 0);
        let rules = [rule(
            "vol",
            AlertRuleType::BalanceVolatility,
            json!({"percentage": 20, "timeWindow": 15}),
        )];

        let history = vec![old.clone(), current.clone()];
        assert!(run(&rules, Some(&old), &current, &history).is_empty());
    }

    #[test]
    fn test_volatility_uses_oldest_snapshot_in_window() {
        let oldest = snapshot(10_000, 12);
        let middle = snapshot(9_500, 6);
        let current = snapshot(7_500, 0);
        let rules = [rule(
            "vol",
            AlertRuleType::BalanceVolatility,
            json!({"percentage": 20, "timeWindow": 15}),
        )];

        let history = vec![current.clone(), middle.clone(), oldest.clone()];
        let alerts = run(&rules, Some(&middle), &current, &history);
        assert_eq!(alerts.len(), 1);
        let details = &alerts[0].details;
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(details.previous_value, Some(Decimal::from(10_000)));
        assert_eq!(details.change_amount, Some(Decimal::from(-2_500)));
        assert_eq!(details.change_percentage, Some(Decimal::from(25)));
        assert_eq!(details.time_window_minutes, Some(15));
    }

    #[test]
    fn test_volatility_with_zero_base_is_silent() {
        let base = snapshot(0, 5);
        let current = snapshot(1_000, 0);
        let rules = [rule(
            "vol",
            AlertRuleType::BalanceVolatility,
            json!({"percentage": 1, "timeWindow": 60}),
        )];
        assert!(run(&rules, Some(&base), &current, &[base.clone()]).is_empty());
    }

    #[test]
    fn test_address_risk() {
        let rules = [rule(
            "risk",
            AlertRuleType::AddressRisk,
            json!({"riskLevels": [3, 4, 5], "alertOnNewAddress": true}),
        )];

        let mut risky = snapshot(100, 0);
        risky.data.risk_level = Some(4);
        let alerts = run(&rules, Some(&snapshot(100, 5)), &risky, &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Error);
        assert_eq!(alerts[0].details.risk_level, Some(4));

        risky.data.risk_level = Some(3);
        let alerts = run(&rules, None, &risky, &[]);
        assert_eq!(alerts[0].severity, Severity::Warning);

        risky.data.risk_level = Some(1);
        assert!(run(&rules, None, &risky, &[]).is_empty());

        // Unclassified address seen for the first time
        let fresh = snapshot(100, 0);
        let alerts = run(&rules, None, &fresh, &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "New address without risk data");
        assert!(run(&rules, Some(&snapshot(100, 5)), &fresh, &[]).is_empty());
    }

    #[test]
    fn test_malformed_rule_is_skipped() {
        let previous = snapshot(10_000, 5);
        let current = snapshot(0, 0);
        let mut disabled = rule("off", AlertRuleType::LargeOutflow, json!({"threshold": 1}));
        disabled.enabled = false;
        let rules = [
            rule("bad", AlertRuleType::LargeOutflow, json!({"threshold": "a lot"})),
            disabled,
            rule("good", AlertRuleType::LargeOutflow, json!({"threshold": 1})),
        ];

        let alerts = run(&rules, Some(&previous), &current, &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id.as_deref(), Some("good"));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let previous = snapshot(10_000, 5);
        let current = snapshot(1_000, 0);
        let rules = [
            rule("out", AlertRuleType::LargeOutflow, json!({"threshold": 500})),
            rule("empty", AlertRuleType::AssetEmptied, json!({})),
        ];

        let strip = |alerts: Vec<Alert>| {
            alerts
                .into_iter()
                .map(|a| (a.rule_id, a.title, a.message, a.details, a.severity, a.triggered_at))
                .collect::<Vec<_>>()
        };
        let first = strip(run(&rules, Some(&previous), &current, &[]));
        let second = strip(run(&rules, Some(&previous), &current, &[]));
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }
}
