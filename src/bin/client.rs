// ABOUTME: Interactive chat-relay client entry point
// ABOUTME: Reads commands from stdin, dispatches them over a ChatClient, and prints incoming events

use argh::FromArgs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatrelay::client::{ChatClient, ChatConnection, ClientBuilder, Command};

/// Interactive chat-relay client.
///
/// Commands once connected:
///   /n <name>          register or rename
///   /w <user> <msg>    whisper
///   /f <user> <path>   send a file
///   exit               disconnect and quit
///   anything else      broadcast chat message
#[derive(FromArgs)]
struct CliArgs {
    /// server hostname or address (default: 127.0.0.1)
    #[argh(option)]
    host: Option<String>,

    /// server port (default: 8080)
    #[argh(option, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli_args: CliArgs = argh::from_env();
    let host = cli_args.host.unwrap_or_else(|| "127.0.0.1".to_string());
    let port = cli_args.port.unwrap_or(8080);
    let addr = format!("{host}:{port}");

    let mut client = ClientBuilder::new().connect(&addr).await?;
    println!("connected to {addr}");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !dispatch(&mut client, &line).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = client.next_event() => {
                match event {
                    Some(event) => println!("{event:?}"),
                    None => {
                        println!("connection closed by server");
                        break;
                    }
                }
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

/// Dispatches one parsed line of input. Returns `Ok(false)` when the user
/// asked to exit.
async fn dispatch(
    client: &mut chatrelay::client::DefaultClient,
    line: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    match chatrelay::client::parse_command(line) {
        Command::Exit => return Ok(false),
        Command::SetName(name) => {
            if client.is_registered() {
                client.update_name(name).await?;
            } else {
                client.register(name).await?;
            }
        }
        Command::Whisper { target, message } => client.whisper(target, message).await?,
        Command::SendFile { target, path } => client.send_file(target, path).await?,
        Command::Chat(message) => {
            if !message.is_empty() {
                client.send_chat(message).await?;
            }
        }
    }

    Ok(true)
}
