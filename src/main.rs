//! SimpleCA - small private certificate authority
//!
//! Serves the certificate authority over HTTP: root CA generation and import,
//! leaf certificate issuance, listing, download and deletion.
//!
//! # Quick Start
//!
//! ```bash
//! # optional: copy and edit the configuration
//! cp config.example.toml config.toml
//!
//! cargo build --release
//! ./target/release/simpleca [path/to/config.toml]
//! ```
//!
//! Logging is controlled through `RUST_LOG` (default `simpleca=info`).

use anyhow::{Context, Result};
use simpleca::configs::AppConfig;
use simpleca::webserver;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("simpleca=info,tower_http=info"))
        .context("Failed to build log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let mut config = AppConfig::from_file(Path::new(&path))?;
            config.apply_env()?;
            config
        }
        None => AppConfig::load()?,
    };

    tracing::info!(
        storage = %config.storage.directory.display(),
        web_root = %config.server.web_root.display(),
        "Starting SimpleCA"
    );

    webserver::start_webserver(config)
        .await
        .context("Web server terminated")
}
