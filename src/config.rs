//! Server configuration loading.
//!
//! An optional TOML file supplies the ambient defaults named in §6
//! (queue capacity, backpressure timeout, downloads directory, bind
//! address); absence of a config file is not an error. CLI flags (parsed
//! separately in `src/bin/server.rs` via `argh`) take precedence over file
//! values, which in turn take precedence over the built-in defaults here.

use std::path::Path;

use serde::Deserialize;

use crate::connection::{BACKPRESSURE_TIMEOUT, QUEUE_CAPACITY};

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_backpressure_timeout_secs() -> u64 {
    BACKPRESSURE_TIMEOUT.as_secs()
}

fn default_downloads_dir() -> String {
    crate::client::DEFAULT_DOWNLOADS_DIR.to_string()
}

/// Deserialized shape of the optional TOML config file. Every field has a
/// default, so a partial or entirely missing file is fine.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    bind: String,
    queue_capacity: usize,
    backpressure_timeout_secs: u64,
    downloads_dir: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            bind: default_bind(),
            queue_capacity: default_queue_capacity(),
            backpressure_timeout_secs: default_backpressure_timeout_secs(),
            downloads_dir: default_downloads_dir(),
        }
    }
}

/// The server's resolved configuration: built-in defaults, overlaid by an
/// optional TOML file, overlaid by CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub queue_capacity: usize,
    pub backpressure_timeout_secs: u64,
    pub downloads_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        let raw = RawConfig::default();
        Config {
            bind: raw.bind,
            queue_capacity: raw.queue_capacity,
            backpressure_timeout_secs: raw.backpressure_timeout_secs,
            downloads_dir: raw.downloads_dir,
        }
    }
}

/// Loads config from a TOML file at `path`. A missing file is not an error
/// — the built-in defaults are returned unchanged.
pub fn load_config(path: &Path) -> crate::error::ChatResult<Config> {
    let raw = match std::fs::read_to_string(path) {
        Ok(contents) => {
            toml::from_str::<RawConfig>(&contents).map_err(|err| {
                crate::error::ChatError::Validation(format!(
                    "malformed config file '{}': {err}",
                    path.display()
                ))
            })?
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => RawConfig::default(),
        Err(err) => return Err(crate::error::ChatError::Io(err)),
    };

    Ok(Config {
        bind: raw.bind,
        queue_capacity: raw.queue_capacity,
        backpressure_timeout_secs: raw.backpressure_timeout_secs,
        downloads_dir: raw.downloads_dir,
    })
}
