use bigdecimal::ToPrimitive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indexer::types::PriceObservation;

/// How a write treats rows already in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Replace,
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Replace => "replace",
            WriteMode::Append => "append",
        }
    }
}

/// Failure reading the watermark from a sink.
#[derive(Error, Debug)]
pub enum SinkReadError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Sink read failed: {0}")]
    Fatal(eyre::Report),
}

/// Destination for normalized price rows.
#[allow(async_fn_in_trait)]
pub trait PriceSink {
    /// Highest persisted block number, `None` when the table exists but is empty.
    async fn max_block(&self, table: &str) -> Result<Option<u64>, SinkReadError>;

    async fn write(
        &self,
        table: &str,
        rows: &[PriceObservation],
        mode: WriteMode,
    ) -> eyre::Result<()>;
}

/// Row layout of the destination table. Numeric columns are stored as doubles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub ticker: String,
    pub updated_at: DateTime<Utc>,
    pub chain: String,
    pub price: f64,
    pub price_decimal: f64,
    #[serde(rename = "type")]
    pub observation_type: String,
    pub threshold: f64,
    pub base: String,
    pub heartbeat: f64,
    pub decimals: f64,
    #[serde(rename = "blockNumber")]
    pub block_number: f64,
    pub tx_hash: String,
}

impl From<&PriceObservation> for PriceRow {
    fn from(obs: &PriceObservation) -> Self {
        Self {
            ticker: obs.ticker.clone(),
            updated_at: obs.updated_at,
            chain: obs.chain.clone(),
            price: obs.price.to_f64().unwrap_or(f64::NAN),
            price_decimal: obs.price_decimal,
            observation_type: obs.observation_type.as_str().to_string(),
            threshold: obs.threshold,
            base: obs.base.clone(),
            heartbeat: obs.heartbeat,
            decimals: obs.decimals as f64,
            block_number: obs.block_number as f64,
            tx_hash: format!("0x{}", hex::encode(obs.tx_hash.as_slice())),
        }
    }
}
