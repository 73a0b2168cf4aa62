//! Command-line entry for the crop scan chat client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;

use crate::chat::{ChatClient, ChatConfig, ChatError, ConversationId, Message};
use crate::chat::types::DEFAULT_CONVERSATION_ID;
use crate::history::{HistoryStore, KeyValueHistory, SqliteBackend};
use crate::logging::init_tracing;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "cropscan-chat")]
#[command(about = "Ask the crop assistant a question from the shell")]
#[command(version)]
pub struct Cli {
    /// Conversation to continue
    #[arg(short, long, default_value = DEFAULT_CONVERSATION_ID)]
    pub conversation: String,

    /// Treat MESSAGE as an image URL or path to analyze
    #[arg(long)]
    pub image: bool,

    /// History database file
    #[arg(long, env = "CROPSCAN_HISTORY_DB", default_value = "cropscan_chat.db")]
    pub db: PathBuf,

    /// Clear the conversation before anything else
    #[arg(long)]
    pub clear: bool,

    /// Print the stored conversation
    #[arg(long)]
    pub show_history: bool,

    /// Message to send
    pub message: Vec<String>,
}

/// Parse arguments, run one command, and map the outcome to an exit code.
#[must_use]
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Classified chat errors already carry the end-user message.
            let message = err
                .downcast_ref::<ChatError>()
                .map_or_else(|| format!("{err:#}"), ToString::to_string);
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

#[allow(clippy::print_stdout)]
async fn execute(cli: Cli) -> anyhow::Result<()> {
    let conversation = ConversationId::from(cli.conversation);
    let backend = SqliteBackend::open(&cli.db)
        .await
        .with_context(|| format!("opening history database {}", cli.db.display()))?;
    let history = Arc::new(KeyValueHistory::new(backend));

    if cli.clear {
        history
            .clear(&conversation)
            .await
            .context("clearing chat history")?;
        tracing::info!(conversation = %conversation, "Cleared chat history");
    }

    let message = cli.message.join(" ");
    if message.trim().is_empty() && !cli.clear && !cli.show_history {
        bail!("nothing to send; pass a MESSAGE, --clear or --show-history");
    }

    if !message.trim().is_empty() {
        let config = ChatConfig::from_env()?;
        let client = ChatClient::new(config, history.clone())?;
        let reply = if cli.image {
            client.send_image(message.trim(), Some(&conversation)).await?
        } else {
            client.send_message(&message, Some(&conversation)).await?
        };
        println!("{reply}");
    }

    if cli.show_history {
        for entry in history.load(&conversation).await {
            println!("{}", format_message(&entry));
        }
    }

    Ok(())
}

fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.role,
        message.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from([
            "cropscan-chat",
            "--conversation",
            "field-2",
            "--db",
            "/tmp/h.db",
            "why",
            "are",
            "leaves",
            "yellow",
        ]);
        assert_eq!(cli.conversation, "field-2");
        assert_eq!(cli.db, PathBuf::from("/tmp/h.db"));
        assert_eq!(cli.message.join(" "), "why are leaves yellow");
        assert!(!cli.image && !cli.clear && !cli.show_history);
    }

    #[test]
    fn test_format_message() {
        let mut message = Message::assistant("Rotate crops yearly.");
        message.created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            format_message(&message),
            "[2024-05-01 10:00:00] assistant: Rotate crops yearly."
        );
    }

    #[tokio::test]
    async fn test_show_history_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let cli = Cli::parse_from([
            "cropscan-chat",
            "--db",
            db.to_str().unwrap(),
            "--clear",
            "--show-history",
        ]);
        execute(cli).await.unwrap();
        assert!(db.exists());
    }

    #[tokio::test]
    async fn test_nothing_to_do_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let cli = Cli::parse_from(["cropscan-chat", "--db", db.to_str().unwrap()]);
        assert!(execute(cli).await.is_err());
    }
}
