use crate::db::sink::{PriceSink, SinkReadError, WriteMode};

/// Where a run starts and how its rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub start_block: u64,
    pub mode: WriteMode,
}

impl Watermark {
    fn from_start(start_block: u64) -> Self {
        let mode = if start_block == 0 {
            WriteMode::Replace
        } else {
            WriteMode::Append
        };
        Self { start_block, mode }
    }
}

/// Resume one block past the highest persisted block. A missing table starts
/// from genesis and replaces; any other sink failure aborts the run.
pub async fn resolve_watermark<S: PriceSink>(sink: &S, table: &str) -> eyre::Result<Watermark> {
    let watermark = match sink.max_block(table).await {
        Ok(Some(max)) => {
            let next = max.checked_add(1).ok_or_else(|| {
                eyre::eyre!(
                    "Persisted max block {} in '{}' cannot be resumed from",
                    max,
                    table
                )
            })?;
            Watermark::from_start(next)
        }
        Ok(None) => {
            tracing::info!(table, "Destination table is empty, starting from block 0");
            Watermark::from_start(0)
        }
        Err(SinkReadError::TableNotFound(name)) => {
            tracing::info!(table = %name, "Destination table does not exist, starting from block 0");
            Watermark::from_start(0)
        }
        Err(SinkReadError::Fatal(e)) => {
            return Err(e.wrap_err(format!("Failed to read watermark for '{}'", table)));
        }
    };

    tracing::info!(
        table,
        from_block = watermark.start_block,
        mode = watermark.mode.as_str(),
        "Resolved watermark"
    );
    Ok(watermark)
}
