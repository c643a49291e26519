//! Client factory. The chat-relay protocol has no bind/credential
//! handshake, so this stays small — it exists mainly to give connection
//! setup a stable, discoverable entry point.

use std::path::PathBuf;

use tokio::net::ToSocketAddrs;

use crate::client::default::DefaultClient;
use crate::client::error::ChatClientResult;

/// Builds a [`DefaultClient`] connected to a server.
pub struct ClientBuilder {
    downloads_dir: Option<PathBuf>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        ClientBuilder { downloads_dir: None }
    }

    /// Overrides the directory incoming files are written into (defaults to
    /// `./downloads`, see [`crate::client::types::DEFAULT_DOWNLOADS_DIR`]).
    pub fn downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = Some(dir.into());
        self
    }

    /// Connects to `addr` and starts the client's background reader task.
    pub async fn connect<T: ToSocketAddrs + Send>(self, addr: T) -> ChatClientResult<DefaultClient> {
        DefaultClient::connect_to(addr, self.downloads_dir).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
