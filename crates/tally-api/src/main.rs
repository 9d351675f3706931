//! `tally-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::Result;

use tally_api::config::Config;
use tally_api::server::Server;
use tally_core::config_store::{ConfigStore, JsonFileStore, MemoryConfigStore};
use tally_core::observability::{init_logging, LogFormat};

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    init_logging(choose_log_format(&config));

    let store: Arc<dyn ConfigStore> = if let Some(path) = config.config_store_path.as_deref() {
        tracing::info!(path = %path.display(), "Using JSON file config store");
        Arc::new(JsonFileStore::open(path).await?)
    } else {
        if !config.debug {
            anyhow::bail!("TALLY_CONFIG_STORE_PATH is required when TALLY_DEBUG=false");
        }
        tracing::warn!("TALLY_CONFIG_STORE_PATH not set; using in-memory config store (debug only)");
        Arc::new(MemoryConfigStore::new())
    };

    let server = Server::builder().config(config).config_store(store).build();
    server.serve().await?;
    Ok(())
}
