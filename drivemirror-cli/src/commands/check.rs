//! Check command - verify both drives are reachable

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use drivemirror_core::domain::format_size;

use super::get_context;
use crate::output::create_table;

pub async fn run(verbose: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let report = ctx.connection_checker()?.check().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Connection Check".bold());
        println!();

        let mut table = create_table();
        table.set_header(vec!["Destination", "Status", "Message"]);
        for check in report.checks() {
            let status = if check.connected {
                Cell::new("PASS").fg(Color::Green)
            } else {
                Cell::new("ERROR").fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(check.destination),
                status,
                Cell::new(check.message()),
            ]);

            if verbose {
                if let Some(quota) = &check.details {
                    let mut lines = Vec::new();
                    if let Some(kind) = &quota.drive_type {
                        lines.push(format!("drive type: {}", kind));
                    }
                    if let Some(total) = quota.total_bytes {
                        lines.push(format!("total: {}", format_size(total)));
                    }
                    for line in lines {
                        table.add_row(vec![
                            Cell::new(""),
                            Cell::new(""),
                            Cell::new(format!("  - {}", line)),
                        ]);
                    }
                }
            }
        }
        println!("{}", table);
        println!();
    }

    if !report.all_connected() {
        anyhow::bail!("At least one destination is unreachable");
    }
    Ok(())
}
