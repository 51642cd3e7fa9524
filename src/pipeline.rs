use alloy::primitives::{Address, B256};
use eyre::WrapErr;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::{AssetConfig, ChainConfig};
use crate::db::sink::PriceSink;
use crate::indexer::decoder;
use crate::indexer::endpoint::ChainEndpoint;
use crate::indexer::fetcher::{self, FetchPolicy};
use crate::indexer::normalizer;
use crate::indexer::schema::EventRegistry;
use crate::indexer::types::{AssetMeta, PriceObservation};
use crate::watermark::{self, Watermark};

/// Outcome of one ingestion run.
#[derive(Debug)]
pub struct RunSummary {
    pub watermark: Watermark,
    pub observations: Vec<PriceObservation>,
    pub written: bool,
}

/// Drives fetch -> decode -> normalize for every configured (chain, asset) pair
/// and hands the sorted result to the sink.
///
/// Endpoints are keyed by the name assets refer to in config.
pub struct Ingestor<E, S> {
    endpoints: HashMap<String, E>,
    sink: S,
    registry: EventRegistry,
    policy: FetchPolicy,
    table: String,
}

impl<E: ChainEndpoint, S: PriceSink> Ingestor<E, S> {
    pub fn new(
        endpoints: HashMap<String, E>,
        sink: S,
        registry: EventRegistry,
        policy: FetchPolicy,
        table: impl Into<String>,
    ) -> Self {
        Self {
            endpoints,
            sink,
            registry,
            policy,
            table: table.into(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Resolve the watermark, collect new observations and write them if there are any.
    pub async fn run(&self, chains: &[ChainConfig]) -> eyre::Result<RunSummary> {
        let watermark = watermark::resolve_watermark(&self.sink, &self.table).await?;
        let observations = self.collect(chains, watermark.start_block).await?;

        if observations.is_empty() {
            tracing::info!(from_block = watermark.start_block, "No new events since block");
            return Ok(RunSummary {
                watermark,
                observations,
                written: false,
            });
        }

        self.sink
            .write(&self.table, &observations, watermark.mode)
            .await
            .wrap_err_with(|| format!("Failed to write to '{}'", self.table))?;

        tracing::info!(
            table = %self.table,
            rows = observations.len(),
            mode = watermark.mode.as_str(),
            "Insert done"
        );

        Ok(RunSummary {
            watermark,
            observations,
            written: true,
        })
    }

    /// Observations for every configured pair from `start_block` to each chain's head,
    /// sorted by update time. Any pair failing aborts the whole collection.
    pub async fn collect(
        &self,
        chains: &[ChainConfig],
        start_block: u64,
    ) -> eyre::Result<Vec<PriceObservation>> {
        let mut aggregate = Vec::new();

        for chain in chains {
            for asset in &chain.assets {
                let rows = self
                    .collect_asset(&chain.name, asset, start_block)
                    .await
                    .wrap_err_with(|| format!("{}: {} ingestion failed", chain.name, asset.ticker))?;
                aggregate.extend(rows);
            }
        }

        // Stable, so rows sharing a timestamp keep their chain order.
        aggregate.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(aggregate)
    }

    async fn collect_asset(
        &self,
        chain: &str,
        asset: &AssetConfig,
        start_block: u64,
    ) -> eyre::Result<Vec<PriceObservation>> {
        let endpoint = self
            .endpoints
            .get(&asset.endpoint)
            .ok_or_else(|| eyre::eyre!("No endpoint configured named '{}'", asset.endpoint))?;
        let address = Address::from_str(&asset.address)
            .map_err(|e| eyre::eyre!("Invalid address '{}': {}", asset.address, e))?;

        let decimals = endpoint.decimals(address).await?;
        let meta = AssetMeta {
            ticker: asset.ticker.clone(),
            chain: chain.to_string(),
            decimals,
            threshold: asset.threshold,
            base: asset.base.clone(),
            heartbeat: asset.heartbeat,
        };

        let topics: Vec<B256> = self.registry.schemas().iter().map(|s| s.selector).collect();
        let logs =
            fetcher::fetch_logs(endpoint, address, &topics, start_block, None, &self.policy).await?;
        let events = decoder::decode_logs(&logs, &self.registry);
        let rows = normalizer::normalize(&events, &meta);

        if let Some((lo, hi)) = price_range(&rows) {
            tracing::info!(
                chain,
                ticker = %asset.ticker.to_uppercase(),
                observations = rows.len(),
                "Observation count = {}, price range: {}-{}",
                rows.len(),
                lo,
                hi
            );
        } else {
            tracing::debug!(chain, ticker = %asset.ticker, logs = logs.len(), "No new observations");
        }

        Ok(rows)
    }
}

fn price_range(rows: &[PriceObservation]) -> Option<(f64, f64)> {
    rows.iter().map(|r| r.price_decimal).fold(None, |acc, p| match acc {
        None => Some((p, p)),
        Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MaxBlockResponse, MemorySink};
    use crate::db::sink::WriteMode;
    use crate::indexer::mock::{answer_log, foreign_log, new_round_log, MockEndpoint, FEED};
    use crate::indexer::schema::{AnswerUpdated, NewRound};
    use alloy::primitives::address;
    use alloy::sol_types::SolEvent;

    const BTC_FEED: Address = address!("2222222222222222222222222222222222222222");

    fn asset(ticker: &str, endpoint: &str, address: Address, base: &str) -> AssetConfig {
        AssetConfig {
            ticker: ticker.to_string(),
            endpoint: endpoint.to_string(),
            address: address.to_string(),
            threshold: 0.5,
            base: base.to_string(),
            heartbeat: 3600.0,
        }
    }

    fn ethereum_chain() -> Vec<ChainConfig> {
        vec![ChainConfig {
            name: "ethereum".to_string(),
            assets: vec![
                asset("eth-usd", "ethereum", FEED, "usd"),
                asset("btc-usd", "ethereum", BTC_FEED, "usd"),
            ],
        }]
    }

    fn ethereum_endpoint(logs: Vec<alloy::rpc::types::Log>) -> MockEndpoint {
        let mut endpoint = MockEndpoint::new("ethereum", 20_000);
        endpoint.decimals.insert(FEED, 8);
        endpoint.decimals.insert(BTC_FEED, 8);
        endpoint.logs = logs;
        endpoint
    }

    fn ingestor(endpoint: MockEndpoint, sink: MemorySink) -> Ingestor<MockEndpoint, MemorySink> {
        let mut endpoints = HashMap::new();
        endpoints.insert("ethereum".to_string(), endpoint);
        Ingestor::new(
            endpoints,
            sink,
            EventRegistry::price_feed(),
            FetchPolicy {
                batch_size: 1_000,
                max_split_depth: 0,
            },
            "oracle_price_history",
        )
    }

    #[tokio::test]
    async fn test_fresh_run_replaces_table() {
        let endpoint = ethereum_endpoint(vec![answer_log(FEED, 100, 300_000_000_000, 1_700_000_000)]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        let summary = ingestor.run(&ethereum_chain()).await.unwrap();

        assert_eq!(summary.watermark.start_block, 0);
        assert!(summary.written);
        let writes = ingestor.sink().writes();
        assert_eq!(writes.len(), 1);
        let (table, rows, mode) = &writes[0];
        assert_eq!(table, "oracle_price_history");
        assert_eq!(*mode, WriteMode::Replace);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "eth-usd");
        assert_eq!(rows[0].price_decimal, 3000.0);
        assert_eq!(rows[0].updated_at.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(rows[0].observation_type.as_str(), "direct");
    }

    #[tokio::test]
    async fn test_incremental_run_appends_only_new_blocks() {
        let endpoint = ethereum_endpoint(vec![
            answer_log(FEED, 12_000, 1, 1_000),
            answer_log(FEED, 12_345, 2, 2_000),
            answer_log(FEED, 12_346, 3, 3_000),
            answer_log(BTC_FEED, 15_000, 4, 4_000),
        ]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::Found(Some(12_345))));

        let summary = ingestor.run(&ethereum_chain()).await.unwrap();

        assert_eq!(summary.watermark.start_block, 12_346);
        assert_eq!(summary.watermark.mode, WriteMode::Append);
        let blocks: Vec<u64> = summary.observations.iter().map(|o| o.block_number).collect();
        assert_eq!(blocks, vec![12_346, 15_000]);
        assert!(summary
            .observations
            .iter()
            .all(|o| o.block_number >= summary.watermark.start_block));
        assert_eq!(ingestor.sink().writes()[0].2, WriteMode::Append);
    }

    #[tokio::test]
    async fn test_no_events_skips_write() {
        let endpoint = ethereum_endpoint(vec![foreign_log(FEED, 10)]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        let summary = ingestor.run(&ethereum_chain()).await.unwrap();

        assert!(summary.observations.is_empty());
        assert!(!summary.written);
        assert!(ingestor.sink().writes().is_empty());
    }

    #[tokio::test]
    async fn test_filter_covers_every_registered_event() {
        let endpoint = ethereum_endpoint(vec![
            new_round_log(FEED, 10, 500),
            answer_log(FEED, 10, 100_000_000, 500),
        ]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        let rows = ingestor.collect(&ethereum_chain(), 0).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price_decimal, 1.0);
        let topics = ingestor.endpoints["ethereum"].topics();
        assert!(topics.contains(&AnswerUpdated::SIGNATURE_HASH));
        assert!(topics.contains(&NewRound::SIGNATURE_HASH));
    }

    #[tokio::test]
    async fn test_aggregate_sorted_by_timestamp() {
        let endpoint = ethereum_endpoint(vec![
            answer_log(FEED, 10, 1, 500),
            answer_log(FEED, 20, 2, 900),
            answer_log(BTC_FEED, 15, 3, 100),
            answer_log(BTC_FEED, 25, 4, 700),
        ]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        let rows = ingestor.collect(&ethereum_chain(), 0).await.unwrap();

        let stamps: Vec<i64> = rows.iter().map(|r| r.updated_at.timestamp()).collect();
        assert_eq!(stamps, vec![100, 500, 700, 900]);
        let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["btc-usd", "eth-usd", "btc-usd", "eth-usd"]);
    }

    #[tokio::test]
    async fn test_collect_is_repeatable() {
        let endpoint = ethereum_endpoint(vec![
            answer_log(FEED, 10, 1, 500),
            answer_log(BTC_FEED, 15, 3, 100),
        ]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        let first = ingestor.collect(&ethereum_chain(), 0).await.unwrap();
        let second = ingestor.collect(&ethereum_chain(), 0).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_asset_failure_aborts_before_write() {
        let mut endpoint = ethereum_endpoint(vec![answer_log(FEED, 10, 1, 500)]);
        endpoint.decimals.remove(&BTC_FEED);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        let result = ingestor.run(&ethereum_chain()).await;

        assert!(result.is_err());
        assert!(ingestor.sink().writes().is_empty());
    }

    #[tokio::test]
    async fn test_window_failure_aborts_before_write() {
        let mut endpoint = ethereum_endpoint(vec![
            answer_log(FEED, 10, 1, 500),
            answer_log(FEED, 1_500, 2, 600),
        ]);
        endpoint.max_results = Some(1);
        endpoint.broken_ranges = vec![(1_000, 1_999)];
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::NotFound));

        assert!(ingestor.run(&ethereum_chain()).await.is_err());
        assert!(ingestor.sink().writes().is_empty());
    }

    #[tokio::test]
    async fn test_watermark_outage_aborts() {
        let endpoint = ethereum_endpoint(vec![answer_log(FEED, 10, 1, 500)]);
        let ingestor = ingestor(endpoint, MemorySink::new(MaxBlockResponse::Broken));

        assert!(ingestor.run(&ethereum_chain()).await.is_err());
        assert!(ingestor.sink().writes().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_chains_use_their_own_endpoints() {
        let eth = ethereum_endpoint(vec![answer_log(FEED, 10, 100_000_000, 200)]);
        let mut arb = MockEndpoint::new("arbitrum", 50);
        arb.decimals.insert(FEED, 6);
        arb.logs = vec![answer_log(FEED, 40, 2_000_000, 100)];

        let mut endpoints = HashMap::new();
        endpoints.insert("ethereum".to_string(), eth);
        endpoints.insert("arbitrum".to_string(), arb);
        let ingestor = Ingestor::new(
            endpoints,
            MemorySink::new(MaxBlockResponse::NotFound),
            EventRegistry::price_feed(),
            FetchPolicy {
                batch_size: 1_000,
                max_split_depth: 0,
            },
            "oracle_price_history",
        );

        let chains = vec![
            ChainConfig {
                name: "ethereum".to_string(),
                assets: vec![asset("eth-usd", "ethereum", FEED, "usd")],
            },
            ChainConfig {
                name: "arbitrum".to_string(),
                assets: vec![asset("eth-usd", "arbitrum", FEED, "usd")],
            },
        ];

        let rows = ingestor.collect(&chains, 0).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].chain, "arbitrum");
        assert_eq!(rows[0].decimals, 6);
        assert_eq!(rows[0].price_decimal, 2.0);
        assert_eq!(rows[1].chain, "ethereum");
        assert_eq!(rows[1].price_decimal, 1.0);
    }
}
