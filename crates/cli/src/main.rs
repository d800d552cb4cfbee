//! LedgerClaw CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  Write the default config (optionally seed demo data)
//! - `agent`    Interactive chat or single-message mode
//! - `gateway`  Start the HTTP API server
//! - `history`  Show or clear stored conversations
//! - `tools`    List the tool catalog

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ledgerclaw",
    about = "LedgerClaw: a financial assistant with confirmed writes",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the ledger database
    Onboard {
        /// Load a small demo dataset into the ledger
        #[arg(long)]
        demo: bool,
    },

    /// Chat with the assistant
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show stored conversation history
    History {
        /// Only this conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Delete instead of listing
        #[arg(long)]
        clear: bool,
    },

    /// List available tools and whether they need confirmation
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard { demo } => commands::onboard::run(demo).await?,
        Commands::Agent { message } => commands::agent::run(message).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::History {
            conversation,
            clear,
        } => commands::history::run(conversation, clear).await?,
        Commands::Tools => commands::tools::run().await?,
    }

    Ok(())
}
