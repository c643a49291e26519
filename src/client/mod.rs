//! Chat-relay client module.
//!
//! This module mirrors the server's per-connection state machine from the
//! client's side of the wire, using a layered trait design:
//!
//! * `ChatConnection` - connection lifecycle (connect/disconnect)
//! * `ChatClient` - the chat protocol's operations (register, chat, whisper, file transfer)
//! * `DefaultClient` - the concrete implementation, backed by a background reader task
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatrelay::client::{ChatClient, ChatConnection, ClientBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = ClientBuilder::new().connect("localhost:8080").await?;
//! client.register("Alice").await?;
//!
//! while let Some(event) = client.next_event().await {
//!     println!("{event:?}");
//! }
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod default;
pub mod error;
pub mod traits;
pub mod types;

pub use builder::ClientBuilder;
pub use default::DefaultClient;
pub use error::{ChatClientError, ChatClientResult};
pub use traits::{ChatClient, ChatConnection};
pub use types::{
    downloads_dir, Command, IncomingTransfer, IncomingTransfers, DEFAULT_CHUNK_SIZE,
    DEFAULT_DOWNLOADS_DIR, parse_command, ClientEvent,
};
