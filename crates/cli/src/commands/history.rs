//! `ledgerclaw history`: inspect or clear stored conversations.

use ledgerclaw_config::AppConfig;
use ledgerclaw_core::history::{ConversationSummary, HistoryRecord, ToolUsage};
use ledgerclaw_core::message::{ConversationId, Role};

pub async fn run(conversation: Option<String>, clear: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store =
        ledgerclaw_memory::open_store(&config.history.backend, &config.history.resolved_path()).await?;
    let id = conversation.map(ConversationId);

    if clear {
        let removed = store.clear(id.as_ref()).await?;
        match &id {
            Some(id) => println!("Removed {removed} messages from conversation {id}."),
            None => println!("Removed {removed} messages."),
        }
        return Ok(());
    }

    if id.is_none() {
        let conversations = store.conversations(20).await?;
        if conversations.is_empty() {
            println!("No stored conversations.");
            return Ok(());
        }
        println!("Recent conversations");
        println!("====================");
        for summary in &conversations {
            println!("{}", summary_line(summary));
        }
        println!();
    }

    let records = store.list(id.as_ref()).await?;
    for record in &records {
        println!("{}", record_line(record));
    }

    Ok(())
}

fn summary_line(summary: &ConversationSummary) -> String {
    let title = summary.first_message.as_deref().unwrap_or("");
    format!(
        "  {}  {:>3} msgs  {}  {}",
        summary.id,
        summary.message_count,
        summary.last_message_at.format("%Y-%m-%d %H:%M"),
        truncate(title, 50)
    )
}

fn record_line(record: &HistoryRecord) -> String {
    let who = match record.role {
        Role::User => "You",
        _ => "Assistant",
    };
    let line = format!(
        "[{}] {who} > {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.content
    );
    if record.tool_calls.is_empty() {
        return line;
    }
    let tools: Vec<String> = record.tool_calls.iter().map(tool_label).collect();
    format!("{line}\n    tools: {}", tools.join(", "))
}

fn tool_label(usage: &ToolUsage) -> String {
    if usage.confirmed {
        format!("{} (confirmed)", usage.tool)
    } else {
        usage.tool.clone()
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
