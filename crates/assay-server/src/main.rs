//! assay-server binary
//!
//! ```text
//! assay-server [config/assay.ron]
//! ```
//!
//! `RUST_LOG` controls logging (default `assay=info`).

use assay_hub::Hub;
use assay_server::{open_store, serve, Config};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("assay=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/assay.ron".to_string());
    info!(path = %config_path, "loading configuration");
    let mut config = Config::load(&config_path)?;
    config.apply_env()?;

    let store = Arc::new(open_store(&config)?);
    let hub = Arc::new(Hub::new(store, config.pool.clone())?);

    let listener = TcpListener::bind(config.listen_addr()?).await?;
    serve(listener, hub).await?;
    Ok(())
}
