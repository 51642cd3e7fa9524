pub mod csv_sink;
#[cfg(test)]
pub mod memory;
pub mod repository;
pub mod sink;

use sqlx::postgres::PgPoolOptions;

use crate::config::{SinkConfig, SinkKind};
use crate::indexer::types::PriceObservation;
use csv_sink::CsvSink;
use repository::PgSink;
use sink::{PriceSink, SinkReadError, WriteMode};

/// The sink selected in config.
pub enum AnySink {
    Postgres(PgSink),
    Csv(CsvSink),
}

impl AnySink {
    pub async fn connect(config: &SinkConfig) -> eyre::Result<Self> {
        match config.kind {
            SinkKind::Postgres => {
                let url = config
                    .url
                    .as_deref()
                    .ok_or_else(|| eyre::eyre!("Postgres sink requires sink.url"))?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;
                tracing::info!("Connected to PostgreSQL");
                Ok(AnySink::Postgres(PgSink::new(pool)))
            }
            SinkKind::Csv => {
                let path = config
                    .path
                    .as_deref()
                    .ok_or_else(|| eyre::eyre!("CSV sink requires sink.path"))?;
                tracing::info!(path, "Writing price history as CSV");
                Ok(AnySink::Csv(CsvSink::new(path)))
            }
        }
    }
}

impl PriceSink for AnySink {
    async fn max_block(&self, table: &str) -> Result<Option<u64>, SinkReadError> {
        match self {
            AnySink::Postgres(s) => s.max_block(table).await,
            AnySink::Csv(s) => s.max_block(table).await,
        }
    }

    async fn write(
        &self,
        table: &str,
        rows: &[PriceObservation],
        mode: WriteMode,
    ) -> eyre::Result<()> {
        match self {
            AnySink::Postgres(s) => s.write(table, rows, mode).await,
            AnySink::Csv(s) => s.write(table, rows, mode).await,
        }
    }
}
