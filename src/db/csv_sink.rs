use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::sink::{PriceRow, PriceSink, SinkReadError, WriteMode};
use crate::config::is_identifier;
use crate::indexer::types::PriceObservation;

/// Flat-file sink: each table is `<dir>/<table>.csv`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, table: &str) -> eyre::Result<PathBuf> {
        if !is_identifier(table) {
            return Err(eyre::eyre!("Invalid table name '{}'", table));
        }
        Ok(self.dir.join(format!("{}.csv", table)))
    }
}

fn read_max_block(path: &Path) -> eyre::Result<Option<u64>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut max: Option<u64> = None;
    for row in reader.deserialize::<PriceRow>() {
        let block = row?.block_number as u64;
        max = Some(max.map_or(block, |m| m.max(block)));
    }
    Ok(max)
}

fn write_rows(dir: &Path, path: &Path, rows: &[PriceRow], mode: WriteMode) -> eyre::Result<()> {
    std::fs::create_dir_all(dir)?;

    let needs_header = mode == WriteMode::Replace
        || std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = match mode {
        WriteMode::Replace => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?,
        WriteMode::Append => OpenOptions::new().create(true).append(true).open(path)?,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// File I/O runs on the blocking pool.
impl PriceSink for CsvSink {
    async fn max_block(&self, table: &str) -> Result<Option<u64>, SinkReadError> {
        let path = self.table_path(table).map_err(SinkReadError::Fatal)?;

        let read_path = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            if !read_path.exists() {
                return Ok(None);
            }
            read_max_block(&read_path).map(Some)
        })
        .await
        .map_err(|e| SinkReadError::Fatal(eyre::eyre!("CSV read task failed: {}", e)))?;

        match result {
            Ok(Some(max)) => Ok(max),
            Ok(None) => Err(SinkReadError::TableNotFound(path.display().to_string())),
            Err(e) => Err(SinkReadError::Fatal(
                e.wrap_err(format!("Failed to read '{}'", path.display())),
            )),
        }
    }

    async fn write(
        &self,
        table: &str,
        rows: &[PriceObservation],
        mode: WriteMode,
    ) -> eyre::Result<()> {
        let path = self.table_path(table)?;
        let count = rows.len();
        let rows: Vec<PriceRow> = rows.iter().map(PriceRow::from).collect();

        let dir = self.dir.clone();
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_rows(&dir, &write_path, &rows, mode))
            .await
            .map_err(|e| eyre::eyre!("CSV write task failed: {}", e))??;

        tracing::debug!(path = %path.display(), rows = count, mode = mode.as_str(), "CSV write complete");
        Ok(())
    }
}
