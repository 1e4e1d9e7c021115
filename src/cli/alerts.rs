use super::poll::alerts_table;
use super::ui;
use crate::core::alert::AlertRepository;
use anyhow::{Result, bail};
use uuid::Uuid;

pub enum AlertAction {
    List,
    MarkRead(Uuid),
    MarkAllRead,
}

pub async fn run(
    repository: &dyn AlertRepository,
    case_id: &str,
    limit: usize,
    action: AlertAction,
) -> Result<()> {
    match action {
        AlertAction::MarkRead(alert_id) => {
            if !repository.mark_read(case_id, alert_id).await? {
                bail!("No alert {} in case {}", alert_id, case_id);
            }
            println!("Marked alert {alert_id} as read");
        }
        AlertAction::MarkAllRead => {
            let changed = repository.mark_all_read(case_id).await?;
            println!("Marked {changed} alerts as read");
        }
        AlertAction::List => {}
    }

    let alerts = repository.list_recent(case_id, limit).await?;
    if alerts.is_empty() {
        println!("{}", ui::style_text("No alerts", ui::StyleType::Subtle));
        return Ok(());
    }

    let unread = alerts.iter().filter(|a| !a.is_read).count();
    println!(
        "Alerts for {} ({} unread of {} shown)\n",
        ui::style_text(case_id, ui::StyleType::Title),
        unread,
        alerts.len()
    );
    println!("{}", alerts_table(&alerts));
    Ok(())
}
