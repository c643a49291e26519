// ABOUTME: Chat-relay server entry point
// ABOUTME: Accepts connections on a TCP listener and spawns one Session per client

use std::path::PathBuf;
use std::sync::Arc;

use argh::FromArgs;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use chatrelay::{load_config, run_server, Registry};

/// Chat-relay server: accepts client connections, brokers registration,
/// chat, whisper, and file-transfer relay.
#[derive(FromArgs)]
struct CliArgs {
    /// address to bind the listener to (overrides the config file and
    /// built-in default of 127.0.0.1:8080)
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// path to an optional TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli_args: CliArgs = argh::from_env();

    let config_path = cli_args.config.unwrap_or_else(|| PathBuf::from("chatrelay.toml"));
    let config = load_config(&config_path).unwrap_or_else(|err| {
        tracing::warn!(error = %err, path = %config_path.display(), "failed to load config, falling back to defaults");
        chatrelay::Config::default()
    });

    let bind = cli_args.bind.unwrap_or(config.bind);

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "chatrelay server listening");

    let registry = Arc::new(Registry::new());
    run_server(listener, registry).await;

    Ok(())
}
