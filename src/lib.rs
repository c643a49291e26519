pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod filechunk;
pub mod frame;
pub mod registry;
pub mod session;

pub use codec::{CodecError, Packet, PacketType};
pub use config::{load_config, Config};
pub use error::{ChatError, ChatResult};
pub use registry::{ClientData, ClientId, Registry, SessionHandle};
pub use session::Session;

pub use client::{ChatClient, ChatClientError, ChatClientResult, ChatConnection, ClientBuilder, DefaultClient};

/// Runs a single chat-relay server: accepts connections on `listener` and
/// spawns one [`Session`] per socket, sharing `registry` across all of them.
///
/// This is the loop `src/bin/server.rs` drives; it's exposed here too so
/// that integration tests can start a server in-process against an
/// ephemeral port.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio::net::TcpListener;
/// use chatrelay::{run_server, Registry};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let listener = TcpListener::bind("127.0.0.1:8080").await?;
///     let registry = Arc::new(Registry::new());
///     run_server(listener, registry).await;
///     Ok(())
/// }
/// ```
pub async fn run_server(listener: tokio::net::TcpListener, registry: std::sync::Arc<Registry>) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept connection");
                continue;
            }
        };

        tracing::debug!(%addr, "accepted connection");
        let session = Session::new(socket, registry.clone());
        tokio::spawn(session.run());
    }
}
