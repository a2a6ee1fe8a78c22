//! Session CLI commands: list and show.
//!
//! Both read straight from the store through the registry's bulk load, so
//! they work without a running server.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use supportdesk_types::chat::{ChatSession, SessionSummary};

use crate::state::AppState;

/// List persisted sessions, most recent activity first.
///
/// ```bash
/// supportdesk sessions
/// supportdesk sessions --json
/// ```
pub async fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    state.registry.load_persisted_sessions().await?;
    let summaries: Vec<SessionSummary> = state
        .registry
        .list_sessions()
        .await
        .iter()
        .map(ChatSession::summary)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start the server with: {}",
            style("i").blue().bold(),
            style("supportdesk serve").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Session").fg(Color::White),
        Cell::new("Guest").fg(Color::White),
        Cell::new("Last activity").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Last message").fg(Color::White),
    ]);

    for summary in &summaries {
        let (last_at, preview) = match &summary.last_message {
            Some(msg) => (
                msg.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                preview(&msg.content, 40),
            ),
            None => ("-".to_string(), String::new()),
        };

        table.add_row(vec![
            Cell::new(&summary.session_id).fg(Color::DarkGrey),
            Cell::new(&summary.display_name).fg(Color::Cyan),
            Cell::new(last_at).fg(Color::White),
            Cell::new(summary.message_count.to_string()).fg(Color::White),
            Cell::new(preview).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(summaries.len()).bold(),
        if summaries.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// Print a session transcript as Markdown (default) or JSON.
pub async fn show_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    state.registry.load_persisted_sessions().await?;
    let session = state
        .registry
        .get_session(session_id)
        .await
        .with_context(|| format!("Session '{session_id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("# {}", session.display_name);
    println!();
    println!("- **Session:** {}", session.session_id);
    println!("- **Messages:** {}", session.messages.len());
    println!();
    println!("---");
    println!();

    for msg in &session.messages {
        let timestamp = msg.timestamp.format("%Y-%m-%d %H:%M");
        println!("### **{}** ({timestamp})", msg.sender);
        println!();
        println!("{}", msg.content);
        println!();
    }

    Ok(())
}

/// First `max_chars` characters of `text` on one line.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
