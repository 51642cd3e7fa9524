//! Sink that keeps everything in memory, for tests.

use std::sync::Mutex;

use super::sink::{PriceSink, SinkReadError, WriteMode};
use crate::indexer::types::PriceObservation;

pub enum MaxBlockResponse {
    Found(Option<u64>),
    NotFound,
    Broken,
}

pub struct MemorySink {
    pub max_block: MaxBlockResponse,
    pub writes: Mutex<Vec<(String, Vec<PriceObservation>, WriteMode)>>,
}

impl MemorySink {
    pub fn new(max_block: MaxBlockResponse) -> Self {
        Self {
            max_block,
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn writes(&self) -> Vec<(String, Vec<PriceObservation>, WriteMode)> {
        self.writes.lock().unwrap().clone()
    }
}

impl PriceSink for MemorySink {
    async fn max_block(&self, table: &str) -> Result<Option<u64>, SinkReadError> {
        match self.max_block {
            MaxBlockResponse::Found(max) => Ok(max),
            MaxBlockResponse::NotFound => Err(SinkReadError::TableNotFound(table.to_string())),
            MaxBlockResponse::Broken => {
                Err(SinkReadError::Fatal(eyre::eyre!("warehouse unavailable")))
            }
        }
    }

    async fn write(
        &self,
        table: &str,
        rows: &[PriceObservation],
        mode: WriteMode,
    ) -> eyre::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((table.to_string(), rows.to_vec(), mode));
        Ok(())
    }
}
