use crate::core::alert::{AlertRule, AlertRuleRepository};
use crate::core::monitor::MonitoredAddress;
use anyhow::{Context, Result};
use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaseConfig {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub addresses: Vec<MonitoredAddress>,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

impl CaseConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn monitored_addresses(&self) -> &[MonitoredAddress] {
        &self.addresses
    }

    /// Rules with their owning case filled in.
    pub fn alert_rules(&self) -> Vec<AlertRule> {
        self.rules
            .iter()
            .cloned()
            .map(|mut rule| {
                rule.case_id = self.id.clone();
                rule
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EndpointConfig {
    pub base_url: String,
}

impl EndpointConfig {
    fn new(base_url: &str) -> Self {
        EndpointConfig {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EthplorerConfig {
    pub base_url: String,
    #[serde(default = "default_ethplorer_key")]
    pub api_key: String,
}

fn default_ethplorer_key() -> String {
    "freekey".to_string()
}

fn default_bitcoin() -> EndpointConfig {
    EndpointConfig::new("https://mempool.space/api")
}

fn default_ethereum() -> EthplorerConfig {
    EthplorerConfig {
        base_url: "https://api.ethplorer.io".to_string(),
        api_key: default_ethplorer_key(),
    }
}

fn default_tron() -> EndpointConfig {
    EndpointConfig::new("https://apilist.tronscanapi.com")
}

fn default_market_price() -> EndpointConfig {
    EndpointConfig::new("https://www.okx.com")
}

fn default_spot_price() -> EndpointConfig {
    EndpointConfig::new("https://api.binance.com")
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default = "default_bitcoin")]
    pub bitcoin: EndpointConfig,
    #[serde(default = "default_ethereum")]
    pub ethereum: EthplorerConfig,
    #[serde(default = "default_tron")]
    pub tron: EndpointConfig,
    #[serde(default = "default_market_price")]
    pub market_price: EndpointConfig,
    #[serde(default = "default_spot_price")]
    pub spot_price: EndpointConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            bitcoin: default_bitcoin(),
            ethereum: default_ethereum(),
            tron: default_tron(),
            market_price: default_market_price(),
            spot_price: default_spot_price(),
        }
    }
}

/// Request timeouts in seconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub chain_secs: u64,
    pub price_secs: u64,
    pub fallback_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            chain_secs: 30,
            price_secs: 10,
            fallback_secs: 5,
        }
    }
}

impl TimeoutsConfig {
    pub fn chain(&self) -> Duration {
        Duration::from_secs(self.chain_secs)
    }

    pub fn price(&self) -> Duration {
        Duration::from_secs(self.price_secs)
    }

    pub fn fallback(&self) -> Duration {
        Duration::from_secs(self.fallback_secs)
    }
}

fn default_price_cache_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub cases: Vec<CaseConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default = "default_price_cache_secs")]
    pub price_cache_secs: u64,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "chainwatch", "chainwatch")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config with {} cases", config.cases.len());
        Ok(config)
    }

    pub fn case(&self, id: &str) -> Option<&CaseConfig> {
        self.cases.iter().find(|case| case.id == id)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_secs)
    }
}

#[async_trait]
impl AlertRuleRepository for AppConfig {
    async fn list_enabled(&self, case_id: &str) -> Result<Vec<AlertRule>> {
        Ok(self
            .case(case_id)
            .map(|case| {
                case.alert_rules()
                    .into_iter()
                    .filter(|rule| rule.enabled)
                    .collect()
            })
            .unwrap_or_default())
    }
}
