use super::ui;
use crate::core::alert::Alert;
use crate::core::config::CaseConfig;
use crate::core::monitor::{Monitor, PollOutcome};
use anyhow::Result;
use comfy_table::Cell;
use tracing::warn;

/// Alert list rendered as a table, newest first as given.
pub fn alerts_table(alerts: &[Alert]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Severity"),
        ui::header_cell("Alert"),
        ui::header_cell("Address"),
        ui::header_cell("Details"),
        ui::header_cell("Triggered"),
    ]);
    for alert in alerts {
        let title = if alert.is_read {
            ui::style_text(&alert.title, ui::StyleType::Subtle)
        } else {
            alert.title.clone()
        };
        table.add_row(vec![
            ui::severity_cell(alert.severity),
            Cell::new(title),
            Cell::new(alert.address_id.as_deref().unwrap_or("-")),
            Cell::new(&alert.message),
            Cell::new(alert.triggered_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    table.to_string()
}

fn display_outcome(case: &CaseConfig, outcome: &PollOutcome) -> String {
    let mut output = format!(
        "Case: {}\n{} snapshots stored, {} alerts triggered, portfolio value ${}\n",
        ui::style_text(case.display_name(), ui::StyleType::Title),
        outcome.snapshots_created,
        outcome.alerts_triggered,
        outcome.portfolio.total_value_formatted
    );
    for balance in outcome.portfolio.balances.iter().filter(|b| !b.is_ok()) {
        output.push_str(&ui::style_text(
            &format!(
                "{} {}: {}\n",
                balance.chain,
                balance.address,
                balance.error.as_deref().unwrap_or_default()
            ),
            ui::StyleType::Error,
        ));
    }
    if !outcome.alerts.is_empty() {
        output.push('\n');
        output.push_str(&alerts_table(&outcome.alerts));
    }
    output
}

pub async fn run(cases: &[&CaseConfig], monitor: &Monitor) -> Result<()> {
    for (i, case) in cases.iter().enumerate() {
        let pb = ui::new_spinner(&format!("Polling {}...", case.display_name()));
        let result = monitor
            .poll_and_detect(&case.id, case.monitored_addresses())
            .await;
        pb.finish_and_clear();

        match result {
            Ok(outcome) => println!("{}", display_outcome(case, &outcome)),
            Err(e) => {
                warn!("Polling case {} failed: {:#}", case.id, e);
                println!(
                    "Case {}: {}",
                    case.display_name(),
                    ui::style_text(&e.to_string(), ui::StyleType::Error)
                );
            }
        }
        if i < cases.len() - 1 {
            ui::print_separator();
        }
    }
    Ok(())
}
