use std::io;

use chatwire::app::{self, AppConfig, Command};
use chatwire::ui::TerminalRenderer;
use chatwire::utils::normalize_url;
use clap::Parser;
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Terminal chat client with realtime delivery.
#[derive(Debug, Parser)]
#[command(name = "chatwire", version)]
struct Args {
    /// Backend URL; saved to the config file when given.
    base_url: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = AppConfig::load();
    if let Some(url) = args.base_url {
        config.base_url = normalize_url(&url);
        if let Err(err) = config.save() {
            error!("failed to save config: {err}");
        }
    }

    let (commands_tx, commands_rx) = mpsc::channel(32);
    tokio::spawn(read_commands(commands_tx));

    let renderer = TerminalRenderer::new(io::stdout());
    match app::run(&config, renderer, commands_rx).await {
        Ok(_) => info!("bye"),
        Err(err) => error!("cannot start against {}: {err}", config.base_url),
    }
}

/// `/open <id>`, `/search <text>`, `/typing`, `/quit`; anything else is sent
/// to the open conversation.
async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = match line.split_once(' ').unwrap_or((line.as_str(), "")) {
            ("/open", id) if !id.trim().is_empty() => Command::Open(id.trim().to_string()),
            ("/search", query) => Command::Search(query.to_string()),
            ("/typing", _) => Command::Typing,
            ("/quit", _) => Command::Quit,
            _ if line.trim().is_empty() => continue,
            _ => Command::Send(line.clone()),
        };
        let quit = command == Command::Quit;
        if tx.send(command).await.is_err() || quit {
            return;
        }
    }
    let _ = tx.send(Command::Quit).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_optional() {
        assert_eq!(Args::try_parse_from(["chatwire"]).unwrap().base_url, None);
        let args = Args::try_parse_from(["chatwire", "localhost:5000"]).unwrap();
        assert_eq!(args.base_url.as_deref(), Some("localhost:5000"));
        assert!(Args::try_parse_from(["chatwire", "a", "b"]).is_err());
    }
}
