//! Workflow task CLI commands.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use voltura_core::repository::task::TaskQueue;

use crate::state::AppState;

/// List failed tasks, most recent first.
///
/// # Examples
///
/// ```bash
/// voltura tasks failed --limit 50
/// ```
pub async fn list_failed(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let tasks = state.scheduler.queue().list_failed(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!();
        println!("  {} No failed tasks.", style("✓").green().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Task").fg(Color::White),
        Cell::new("Queue").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Failed at").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);

    for task in &tasks {
        let kind = task
            .payload
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("-");
        let error = task.last_error.as_deref().unwrap_or("");
        let error = if error.chars().count() > 60 {
            format!("{}...", error.chars().take(57).collect::<String>())
        } else {
            error.to_string()
        };

        table.add_row(vec![
            Cell::new(task.id.to_string()).fg(Color::DarkGrey),
            Cell::new(&task.queue).fg(Color::Cyan),
            Cell::new(kind),
            Cell::new(format!("{}/{}", task.attempts, task.max_attempts)),
            Cell::new(task.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(error).fg(Color::Red),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} failed task{}",
        style(tasks.len()).bold(),
        if tasks.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}
