use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use std::future::IntoFuture;
use std::time::Duration;
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::indexer::schema::AggregatorV3;

/// Outcome of a rejected `eth_getLogs` call.
#[derive(Error, Debug)]
pub enum LogQueryError {
    /// The endpoint refused the range, typically because the result would exceed its cap.
    #[error("Log query rejected by endpoint: {0}")]
    TooLarge(String),

    /// Anything else: transport failure, timeout, malformed response.
    #[error("Log query failed: {0}")]
    Fatal(eyre::Report),
}

/// What the indexer needs from a chain node.
#[allow(async_fn_in_trait)]
pub trait ChainEndpoint {
    fn name(&self) -> &str;

    /// Lowest block the batching fallback will scan.
    fn deployment_floor(&self) -> u64;

    async fn head_block(&self) -> eyre::Result<u64>;

    /// Logs emitted by `address` in the inclusive range whose topic[0] is one of `topics`.
    async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, LogQueryError>;

    /// Read-only `decimals()` call on the feed contract.
    async fn decimals(&self, address: Address) -> eyre::Result<u8>;
}

/// JSON-RPC endpoint over HTTP.
pub struct RpcEndpoint {
    name: String,
    deployment_floor: u64,
    timeout: Duration,
    provider: DynProvider,
}

impl RpcEndpoint {
    pub fn connect(config: &EndpointConfig, timeout: Duration) -> eyre::Result<Self> {
        let provider = ProviderBuilder::new()
            .connect_http(
                config
                    .rpc_http
                    .parse()
                    .map_err(|e| eyre::eyre!("Invalid RPC URL for '{}': {}", config.name, e))?,
            )
            .erased();

        Ok(Self::with_provider(
            &config.name,
            config.deployment_floor,
            timeout,
            provider,
        ))
    }

    pub(crate) fn with_provider(
        name: &str,
        deployment_floor: u64,
        timeout: Duration,
        provider: DynProvider,
    ) -> Self {
        Self {
            name: name.to_string(),
            deployment_floor,
            timeout,
            provider,
        }
    }

    async fn timed<T>(&self, fut: impl IntoFuture<Output = T>) -> eyre::Result<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            eyre::eyre!(
                "RPC call to '{}' timed out after {}s",
                self.name,
                self.timeout.as_secs()
            )
        })
    }
}

impl ChainEndpoint for RpcEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn deployment_floor(&self) -> u64 {
        self.deployment_floor
    }

    async fn head_block(&self) -> eyre::Result<u64> {
        self.timed(self.provider.get_block_number())
            .await?
            .map_err(|e| eyre::eyre!("Failed to get head block from '{}': {}", self.name, e))
    }

    async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, LogQueryError> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topics.to_vec())
            .from_block(from_block)
            .to_block(to_block);

        let result = self
            .timed(self.provider.get_logs(&filter))
            .await
            .map_err(LogQueryError::Fatal)?;

        // A JSON-RPC error payload means the node understood and refused the query.
        result.map_err(|e| match e.as_error_resp() {
            Some(payload) => {
                LogQueryError::TooLarge(format!("{} (code {})", payload.message, payload.code))
            }
            None => LogQueryError::Fatal(eyre::eyre!("{}", e)),
        })
    }

    async fn decimals(&self, address: Address) -> eyre::Result<u8> {
        let feed = AggregatorV3::new(address, self.provider.clone());
        self.timed(feed.decimals().call())
            .await?
            .map_err(|e| eyre::eyre!("decimals() call on {} failed: {}", address, e))
    }
}
