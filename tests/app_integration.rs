use chainwatch::AppCommand;
use chainwatch::core::alert::{AlertRepository, AlertRuleType};
use chainwatch::store::DiskStore;
use std::fs;
use tempfile::TempDir;
use tracing::info;

const BTC_ADDRESS: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";
const TRON_ADDRESS: &str = "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7";

mod test_utils {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves every upstream API from one server. The bitcoin address holds
    /// 1 BTC for the first `funded_polls` requests and nothing afterwards.
    pub async fn create_mock_server(funded_polls: u64) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/address/{}", super::BTC_ADDRESS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chain_stats": { "funded_txo_sum": 100_000_000u64, "spent_txo_sum": 0 }
            })))
            .up_to_n_times(funded_polls)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/address/{}", super::BTC_ADDRESS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chain_stats": { "funded_txo_sum": 100_000_000u64, "spent_txo_sum": 100_000_000u64 }
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/account/tokens"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v5/dex/market/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "0",
                "msg": "",
                "data": [{ "chainIndex": "0", "tokenContractAddress": "", "price": "50000" }]
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "symbol": "BTCUSDT", "price": "50000.00" }])),
            )
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn config_yaml(base_url: &str, data_path: &str) -> String {
        format!(
            r#"
cases:
  - id: treasury
    name: Treasury
    addresses:
      - id: cold-btc
        chain: BTC
        address: {btc}
      - id: payouts
        chain: TRON
        address: {tron}
    rules:
      - id: drained
        type: asset_emptied
        name: Drained
        config: {{ threshold: 1, percentage: null }}
      - id: outflow
        type: large_outflow
        name: Big outflow
        config: {{ threshold: 1000 }}
providers:
  bitcoin: {{ base_url: "{base_url}" }}
  ethereum: {{ base_url: "{base_url}" }}
  tron: {{ base_url: "{base_url}" }}
  market_price: {{ base_url: "{base_url}" }}
  spot_price: {{ base_url: "{base_url}" }}
timeouts:
  chain_secs: 5
  price_secs: 5
  fallback_secs: 5
data_path: "{data_path}"
"#,
            btc = super::BTC_ADDRESS,
            tron = super::TRON_ADDRESS,
        )
    }
}

#[test_log::test(tokio::test)]
async fn test_full_poll_flow_with_mock() {
    let mock_server = test_utils::create_mock_server(1).await;
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        test_utils::config_yaml(&mock_server.uri(), &data_dir.display().to_string()),
    )
    .unwrap();
    let config_path = config_path.to_str().unwrap();

    for round in 0..2 {
        info!(round, "Polling");
        chainwatch::run_command(AppCommand::Poll { case: None }, Some(config_path))
            .await
            .unwrap();
    }

    let result = chainwatch::run_command(
        AppCommand::Alerts {
            case: "treasury".to_string(),
            limit: 10,
            mark_read: None,
            mark_all_read: true,
        },
        Some(config_path),
    )
    .await;
    assert!(result.is_ok(), "alerts command failed: {result:?}");

    let store = DiskStore::open(&data_dir.join("store")).unwrap();
    let alerts = store.list_recent("treasury", 10).await.unwrap();
    let mut types: Vec<AlertRuleType> = alerts.iter().map(|a| a.alert_type).collect();
    types.sort_by_key(|t| t.to_string());
    assert_eq!(
        types,
        vec![AlertRuleType::AssetEmptied, AlertRuleType::LargeOutflow]
    );
    assert!(alerts.iter().all(|a| a.is_read));
    assert!(
        alerts
            .iter()
            .all(|a| a.address_id.as_deref() == Some("cold-btc"))
    );
}

#[test_log::test(tokio::test)]
async fn test_portfolio_command_with_mock() {
    let mock_server = test_utils::create_mock_server(1).await;
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        test_utils::config_yaml(
            &mock_server.uri(),
            &temp_dir.path().join("data").display().to_string(),
        ),
    )
    .unwrap();

    let result = chainwatch::run_command(
        AppCommand::Portfolio {
            case: Some("treasury".to_string()),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "portfolio command failed: {result:?}");

    let unknown = chainwatch::run_command(
        AppCommand::Portfolio {
            case: Some("missing".to_string()),
        },
        config_path.to_str(),
    )
    .await;
    assert_eq!(unknown.unwrap_err().to_string(), "Unknown case: missing");
}
