//! HTTP boundary for assay
//!
//! Serves analysis runs and a few read-only asset lookups over HTTP/1.1.
//! See [`routes`] for the endpoints.

pub mod config;
pub mod routes;
pub mod seed;

pub use config::{Config, ConfigError};
pub use routes::{dispatch, handle_request};
pub use seed::{Seed, SeedError, SeedSummary};

use assay_db::Store;
use assay_hub::Hub;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Open the configured store and apply the seed, if any
pub fn open_store(config: &Config) -> Result<Store, Box<dyn std::error::Error + Send + Sync>> {
    let store = match &config.database {
        Some(path) => Store::open(path)?,
        None => Store::in_memory()?,
    };
    if let Some(seed) = &config.seed {
        Seed::load(seed)?.apply(&store)?;
    }
    Ok(store)
}

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };

        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(Arc::clone(&hub), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(%remote_addr, error = %e, "connection error");
            }
        });
    }
}
