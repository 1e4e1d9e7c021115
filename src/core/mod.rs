//! Core business logic: balances, pricing, snapshots and alert rules

pub mod alert;
pub mod balance;
pub mod cache;
pub mod chain;
pub mod config;
pub mod log;
pub mod monitor;
pub mod normalizer;
pub mod portfolio;
pub mod price;
pub mod rules;
pub mod snapshot;

// Re-export main types for cleaner imports
pub use alert::{Alert, AlertRepository, AlertRule, AlertRuleRepository, AlertRuleType, Severity};
pub use balance::{ChainBalance, Portfolio, Token};
pub use chain::{Chain, TokenListProvider};
pub use monitor::{Monitor, MonitoredAddress, PollOutcome};
pub use portfolio::{AddressQuery, ChainPortfolioResolver, PortfolioAggregator, PortfolioError};
pub use price::{PriceOracle, PriceRequest, PriceSource};
pub use rules::AlertRuleEngine;
pub use snapshot::{BalanceSnapshot, SnapshotRepository};
