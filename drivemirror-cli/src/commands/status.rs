//! Status command - latest backup of every configuration

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, ContentArrangement, Table};
use drivemirror_core::UserId;

use super::get_context;
use crate::output::{create_table, status_label};

pub async fn run(user: &UserId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.overview(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Backup Status".bold());
    println!();

    let mut summary = Table::new();
    summary.set_content_arrangement(ContentArrangement::Dynamic);
    summary.add_row(vec!["Configurations", &status.total_configs.to_string()]);
    summary.add_row(vec!["Failing", &status.failing_configs.to_string()]);
    println!("{}", summary);
    println!();

    if status.configs.is_empty() {
        println!("{}", "No backup configurations".dimmed());
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["ID", "Name", "Sources", "Retention", "Backups", "Last", "Status", "Size"]);
    for entry in &status.configs {
        let (date, label, size) = match &entry.last_backup {
            Some(last) => (
                last.date.to_string(),
                status_label(last.status).to_string(),
                last.size_display.clone(),
            ),
            None => ("never".to_string(), "-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(&entry.name),
            Cell::new(entry.source_count),
            Cell::new(entry.retention),
            Cell::new(format!("{}/{}", entry.completed_backups, entry.total_backups)),
            Cell::new(date),
            Cell::new(label),
            Cell::new(size),
        ]);
    }
    println!("{table}");

    for entry in &status.configs {
        if let Some(error) = entry.last_backup.as_ref().and_then(|l| l.error.as_deref()) {
            println!("{} {}: {}", "✗".red(), entry.name, error);
        }
    }
    Ok(())
}
