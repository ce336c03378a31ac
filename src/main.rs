// src/main.rs
mod api;
mod batch;
mod client;
mod config;
mod header;
mod ingest;
mod logging;
mod model;
mod scene;
mod staging;
mod types;
mod upload;

use config::AppConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();
    logging::init();
    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    info!("🚀 Stowage console starting...");
    api::start_api_server(app_config).await;
}
