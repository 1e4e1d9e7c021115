pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::{cache, config, log};

use crate::cli::alerts::AlertAction;
use crate::core::alert::AlertRepository;
use crate::core::chain::TokenListProvider;
use crate::core::config::{AppConfig, CaseConfig};
use crate::core::monitor::Monitor;
use crate::core::portfolio::{ChainPortfolioResolver, PortfolioAggregator};
use crate::core::price::{PriceOracle, PriceSource};
use crate::core::rules::AlertRuleEngine;
use crate::core::snapshot::SnapshotRepository;
use crate::providers::{
    CachingPriceSource, EsploraProvider, EthplorerProvider, MarketPriceProvider,
    SpotPriceProvider, TronscanProvider,
};
use crate::store::DiskStore;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub enum AppCommand {
    Portfolio {
        case: Option<String>,
    },
    Poll {
        case: Option<String>,
    },
    Alerts {
        case: String,
        limit: usize,
        mark_read: Option<Uuid>,
        mark_all_read: bool,
    },
}

/// Chain clients and price sources wired from configuration.
pub fn build_aggregator(config: &AppConfig) -> Result<PortfolioAggregator> {
    let providers = &config.providers;
    let timeouts = &config.timeouts;

    let clients: Vec<Arc<dyn TokenListProvider>> = vec![
        Arc::new(EsploraProvider::new(&providers.bitcoin.base_url, timeouts.chain())?),
        Arc::new(EthplorerProvider::new(
            &providers.ethereum.base_url,
            &providers.ethereum.api_key,
            timeouts.chain(),
        )?),
        Arc::new(TronscanProvider::new(&providers.tron.base_url, timeouts.chain())?),
    ];

    let market: Arc<dyn PriceSource> = Arc::new(MarketPriceProvider::new(
        &providers.market_price.base_url,
        timeouts.price(),
    )?);
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(CachingPriceSource::new(market, config.price_cache_ttl())),
        Arc::new(SpotPriceProvider::new(
            &providers.spot_price.base_url,
            timeouts.fallback(),
        )?),
    ];

    let resolver = clients.into_iter().fold(
        ChainPortfolioResolver::new(Arc::new(PriceOracle::new(sources)))
            .with_fetch_timeout(timeouts.chain()),
        |resolver, client| resolver.with_client(client),
    );
    Ok(PortfolioAggregator::new(Arc::new(resolver)))
}

fn open_store(config: &AppConfig) -> Result<DiskStore> {
    let data_path = config.data_path()?;
    std::fs::create_dir_all(&data_path)
        .with_context(|| format!("Failed to create data directory: {}", data_path.display()))?;
    DiskStore::open(&data_path.join("store"))
}

fn select_cases<'a>(config: &'a AppConfig, case: Option<&str>) -> Result<Vec<&'a CaseConfig>> {
    match case {
        Some(id) => match config.case(id) {
            Some(case) => Ok(vec![case]),
            None => bail!("Unknown case: {id}"),
        },
        None if config.cases.is_empty() => bail!("No cases configured"),
        None => Ok(config.cases.iter().collect()),
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("chainwatch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Portfolio { case } => {
            let cases = select_cases(&config, case.as_deref())?;
            let aggregator = build_aggregator(&config)?;
            cli::portfolio::run(&cases, &aggregator).await
        }
        AppCommand::Poll { case } => {
            let cases = select_cases(&config, case.as_deref())?;
            let aggregator = Arc::new(build_aggregator(&config)?);
            let store = Arc::new(open_store(&config)?);
            let snapshots: Arc<dyn SnapshotRepository> = store.clone();
            let alerts: Arc<dyn AlertRepository> = store;
            let engine = AlertRuleEngine::new(Arc::new(config.clone()), Arc::clone(&snapshots));
            let monitor = Monitor::new(aggregator, snapshots, alerts, engine);
            cli::poll::run(&cases, &monitor).await
        }
        AppCommand::Alerts {
            case,
            limit,
            mark_read,
            mark_all_read,
        } => {
            select_cases(&config, Some(case.as_str()))?;
            let store = open_store(&config)?;
            let action = match (mark_read, mark_all_read) {
                (Some(id), _) => AlertAction::MarkRead(id),
                (None, true) => AlertAction::MarkAllRead,
                (None, false) => AlertAction::List,
            };
            cli::alerts::run(&store, &case, limit, action).await
        }
    }
}
