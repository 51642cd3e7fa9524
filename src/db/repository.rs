use sqlx::PgPool;

use super::sink::{PriceRow, PriceSink, SinkReadError, WriteMode};
use crate::config::is_identifier;
use crate::indexer::types::PriceObservation;

const UNDEFINED_TABLE: &str = "42P01";

/// Postgres-backed price history table.
#[derive(Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn checked_table(table: &str) -> eyre::Result<&str> {
    if is_identifier(table) {
        Ok(table)
    } else {
        Err(eyre::eyre!("Invalid table name '{}'", table))
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
            ticker TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            chain TEXT NOT NULL,
            price DOUBLE PRECISION,
            price_decimal DOUBLE PRECISION,
            "type" TEXT NOT NULL,
            threshold DOUBLE PRECISION,
            base TEXT NOT NULL,
            heartbeat DOUBLE PRECISION,
            decimals DOUBLE PRECISION,
            "blockNumber" DOUBLE PRECISION NOT NULL,
            tx_hash TEXT NOT NULL
        )"#,
        table
    )
}

impl PriceSink for PgSink {
    async fn max_block(&self, table: &str) -> Result<Option<u64>, SinkReadError> {
        let table = checked_table(table).map_err(SinkReadError::Fatal)?;

        let sql = format!(r#"SELECT MAX("blockNumber") FROM {}"#, table);
        let row: Result<(Option<f64>,), sqlx::Error> =
            sqlx::query_as(&sql).fetch_one(&self.pool).await;

        match row {
            Ok((max,)) => Ok(max.map(|b| b as u64)),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNDEFINED_TABLE) => {
                Err(SinkReadError::TableNotFound(table.to_string()))
            }
            Err(e) => Err(SinkReadError::Fatal(e.into())),
        }
    }

    /// Replace drops and recreates the table; both modes insert in one transaction,
    /// chunked into groups of 1000 rows to stay within parameter limits.
    async fn write(
        &self,
        table: &str,
        rows: &[PriceObservation],
        mode: WriteMode,
    ) -> eyre::Result<()> {
        let table = checked_table(table)?;
        let rows: Vec<PriceRow> = rows.iter().map(PriceRow::from).collect();

        let mut tx = self.pool.begin().await?;

        if mode == WriteMode::Replace {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&create_table_sql(table))
            .execute(&mut *tx)
            .await?;

        for chunk in rows.chunks(1000) {
            let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
                sqlx::QueryBuilder::new(format!(
                    "INSERT INTO {} (ticker, updated_at, chain, price, price_decimal, \"type\", \
                     threshold, base, heartbeat, decimals, \"blockNumber\", tx_hash) ",
                    table
                ));

            query_builder.push_values(chunk, |mut b, r| {
                b.push_bind(&r.ticker)
                    .push_bind(r.updated_at)
                    .push_bind(&r.chain)
                    .push_bind(r.price)
                    .push_bind(r.price_decimal)
                    .push_bind(&r.observation_type)
                    .push_bind(r.threshold)
                    .push_bind(&r.base)
                    .push_bind(r.heartbeat)
                    .push_bind(r.decimals)
                    .push_bind(r.block_number)
                    .push_bind(&r.tx_hash);
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::debug!(table, rows = rows.len(), mode = mode.as_str(), "Postgres write committed");
        Ok(())
    }
}
