use std::collections::HashMap;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use oracle_price_indexer::config::Config;
use oracle_price_indexer::db::AnySink;
use oracle_price_indexer::indexer::endpoint::{ChainEndpoint, RpcEndpoint};
use oracle_price_indexer::indexer::fetcher::FetchPolicy;
use oracle_price_indexer::indexer::schema::EventRegistry;
use oracle_price_indexer::pipeline::Ingestor;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for dropped-log detail)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Oracle price indexer starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        chains = config.chains.len(),
        endpoints = config.endpoints.len(),
        "Configuration loaded from {}",
        config_path
    );

    // One client per configured endpoint, handed to the ingestor explicitly
    let timeout = Duration::from_secs(config.fetch.timeout_secs);
    let mut endpoints = HashMap::new();
    for endpoint_config in &config.endpoints {
        let endpoint = RpcEndpoint::connect(endpoint_config, timeout)?;
        let head = endpoint.head_block().await?;
        tracing::info!(endpoint = %endpoint_config.name, head, "Endpoint connected");
        endpoints.insert(endpoint_config.name.clone(), endpoint);
    }

    let sink = AnySink::connect(&config.sink).await?;

    let ingestor = Ingestor::new(
        endpoints,
        sink,
        EventRegistry::price_feed(),
        FetchPolicy::from(&config.fetch),
        config.sink.table.clone(),
    );

    let summary = ingestor.run(&config.chains).await?;

    tracing::info!(
        from_block = summary.watermark.start_block,
        rows = summary.observations.len(),
        written = summary.written,
        "Oracle price indexer finished"
    );
    Ok(())
}
