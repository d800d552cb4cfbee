//! `ledgerclaw agent`: interactive or single-message chat mode.

use ledgerclaw_agent::{Assistant, Reply};
use ledgerclaw_config::AppConfig;
use ledgerclaw_core::message::ConversationId;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const CLIENT_KEY: &str = "cli";

type Input = Lines<BufReader<Stdin>>;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LEDGERCLAW_API_KEY");
        eprintln!("    ANTHROPIC_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let assistant = ledgerclaw_agent::assistant_from_config(&config).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation = ConversationId::new();
    tracing::debug!(conversation_id = %conversation, "Chat session started");

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = assistant.send_message(CLIENT_KEY, Some(conversation), &msg).await;
        eprint!("\r              \r");
        settle(&assistant, reply?, &mut input).await?;
        return Ok(());
    }

    println!();
    println!("  LedgerClaw Assistant: Interactive Mode");
    println!("  ======================================");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Tools:     {}", assistant.tool_catalog().len());
    println!(
        "  Writes:    {}",
        if assistant.writes_simulated() { "simulated (dry run)" } else { "live" }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let reply = assistant
            .send_message(CLIENT_KEY, Some(conversation.clone()), line)
            .await;
        eprint!("\r     \r");

        match reply {
            Ok(reply) => {
                if let Some(id) = settle(&assistant, reply, &mut input).await? {
                    conversation = id;
                }
            }
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

/// Print a reply; a pending confirmation is put to the user and resolved.
async fn settle(
    assistant: &Assistant,
    reply: Reply,
    input: &mut Input,
) -> Result<Option<ConversationId>, Box<dyn std::error::Error>> {
    let (token, tool_name, description, raw_input, conversation_id) = match reply {
        Reply::ConfirmationNeeded {
            token,
            tool_name,
            description,
            raw_input,
            conversation_id,
        } => (token, tool_name, description, raw_input, conversation_id),
        other => {
            print_reply(&other);
            return Ok(reply_conversation(&other));
        }
    };

    println!();
    println!("  Confirmation required: {tool_name}");
    println!("    {description}");
    println!("    {}", serde_json::to_string(&raw_input)?);
    print!("  Proceed? [y/N] ");
    std::io::stdout().flush()?;

    let answer = input.next_line().await?.unwrap_or_default();
    let resolved = assistant.resolve_confirmation(&token, is_yes(&answer)).await;
    match resolved {
        Ok(reply) => print_reply(&reply),
        Err(e) => eprintln!("  [Error] {e}"),
    }
    Ok(Some(conversation_id))
}

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Message { text, tools_used, .. } => {
            for usage in tools_used {
                let mark = if usage.confirmed { " (confirmed)" } else { "" };
                println!("  [tool] {}{mark}", usage.description);
            }
            println!();
            for line in text.lines() {
                println!("  Assistant > {line}");
            }
        }
        Reply::Error { text } => eprintln!("  [Error] {text}"),
        Reply::ConfirmationNeeded { description, .. } => println!("  Pending: {description}"),
    }
}

fn reply_conversation(reply: &Reply) -> Option<ConversationId> {
    match reply {
        Reply::Message { conversation_id, .. } | Reply::ConfirmationNeeded { conversation_id, .. } => {
            Some(conversation_id.clone())
        }
        Reply::Error { .. } => None,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí")
}
