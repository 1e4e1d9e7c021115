use super::ui;
use crate::core::balance::{ChainBalance, Portfolio};
use crate::core::config::CaseConfig;
use crate::core::normalizer::format_usd;
use crate::core::portfolio::{AddressQuery, PortfolioAggregator};
use anyhow::Result;
use comfy_table::Cell;
use tracing::info;

impl ChainBalance {
    pub fn display_as_table(&self) -> String {
        let mut output = format!(
            "{} {}\n",
            ui::style_text(&self.chain.to_string(), ui::StyleType::Title),
            ui::style_text(&self.address, ui::StyleType::Subtle)
        );

        if let Some(error) = &self.error {
            output.push_str(&ui::style_text(
                &format!("Query failed: {error}"),
                ui::StyleType::Error,
            ));
            return output;
        }
        if let Some(risk_level) = self.risk_level {
            output.push_str(&format!("Risk level: {risk_level}\n"));
        }
        if self.tokens.is_empty() {
            output.push_str(&ui::style_text("No holdings", ui::StyleType::Subtle));
            return output;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Token"),
            ui::header_cell("Standard"),
            ui::header_cell("Balance"),
            ui::header_cell("Price (USD)"),
            ui::header_cell("Value (USD)"),
        ]);
        for token in &self.tokens {
            table.add_row(vec![
                Cell::new(format!("{} ({})", token.symbol, token.name)),
                Cell::new(format!("{:?}", token.standard)),
                ui::right_cell(&token.balance_formatted),
                ui::right_cell(&format!("{:.4}", token.price)),
                ui::usd_cell(&token.usd_value_formatted),
            ]);
        }

        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n{} {}",
            ui::style_text("Total:", ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("${}", self.total_value_formatted),
                ui::StyleType::TotalValue
            )
        ));
        output
    }
}

fn display_portfolio(case: &CaseConfig, portfolio: &Portfolio) -> String {
    let mut output = format!(
        "Case: {}\n\n",
        ui::style_text(case.display_name(), ui::StyleType::Title)
    );
    let sections: Vec<String> = portfolio
        .balances
        .iter()
        .map(ChainBalance::display_as_table)
        .collect();
    output.push_str(&sections.join("\n\n"));
    output.push_str(&format!(
        "\n\n{} {} ({}/{} addresses resolved)",
        ui::style_text("Portfolio value:", ui::StyleType::TotalLabel),
        ui::style_text(
            &format!("${}", portfolio.total_value_formatted),
            ui::StyleType::TotalValue
        ),
        portfolio.resolved_count(),
        portfolio.balances.len()
    ));
    output
}

pub async fn run(cases: &[&CaseConfig], aggregator: &PortfolioAggregator) -> Result<()> {
    info!("Fetching balances for {} cases", cases.len());

    let mut grand_total = 0.0;
    for (i, case) in cases.iter().enumerate() {
        let queries: Vec<AddressQuery> = case
            .monitored_addresses()
            .iter()
            .map(|a| AddressQuery::new(a.chain, a.address.clone()))
            .collect();

        let pb = ui::new_spinner(&format!("Fetching balances for {}...", case.display_name()));
        let result = aggregator.aggregate(&queries).await;
        pb.finish_and_clear();

        match result {
            Ok(portfolio) => {
                grand_total += portfolio.total_value;
                println!("{}", display_portfolio(case, &portfolio));
            }
            Err(e) => println!(
                "Case {}: {}",
                case.display_name(),
                ui::style_text(&e.to_string(), ui::StyleType::Error)
            ),
        }
        if i < cases.len() - 1 {
            ui::print_separator();
        }
    }

    if cases.len() > 1 {
        println!(
            "\n{} {}",
            ui::style_text("Grand total:", ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("${}", format_usd(grand_total)),
                ui::StyleType::TotalValue
            )
        );
    }
    Ok(())
}
